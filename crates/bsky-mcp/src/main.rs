//! bsky-mcp: MCP server for Bluesky with session-scoped authentication.
//!
//! # Subcommands
//!
//! - `serve`     Start the MCP server (stdio, or TCP with `--listen`)
//! - `config`    Show resolved configuration
//! - `check-env` Report which credential variables are set

use bsky_mcp_core::logging;
use clap::Parser;

use bsky_mcp::cli::{Cli, Commands};
use bsky_mcp::commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(&cli.config, args).await,
        Commands::Config(args) => commands::config_cmd::run(&cli.config, args).await,
        Commands::CheckEnv(args) => commands::check_env::run(args).await,
    }
}
