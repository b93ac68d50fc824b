//! Configuration resolution for bsky-mcp.
//!
//! The entry point is [`resolve_config`], which layers config files and
//! `BSKY_MCP_*` environment variables over compiled-in defaults into a
//! [`BskyMcpConfig`].
//!
//! See [`resolve`] for the full priority chain and [`types`] for all config types.

mod resolve;
mod types;

pub use resolve::{CONFIG_FILE_NAME, resolve_config};
pub use types::{AuthPolicy, BskyMcpConfig, ConfigError};
