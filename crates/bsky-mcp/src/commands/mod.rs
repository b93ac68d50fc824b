//! Command implementations for bsky-mcp subcommands.
//!
//! Each module corresponds to a top-level subcommand exposed by the CLI.

pub mod check_env;
pub mod config_cmd;
pub mod serve;
