//! CLI argument types for bsky-mcp.
//!
//! Defines the top-level [`Cli`] struct and all subcommand [`Args`] using
//! clap's derive macros. Each subcommand maps to a module in [`crate::commands`].

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AuthPolicy;

/// MCP server for Bluesky with per-session authentication
#[derive(Parser, Debug)]
#[command(name = "bsky-mcp", version, about)]
pub struct Cli {
    /// Path to a bsky-mcp.toml config file (default: ./bsky-mcp.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the MCP server on stdio or a TCP listener
    Serve(ServeArgs),
    /// Show resolved configuration
    Config(ConfigArgs),
    /// Report which credential variables are set (values are never shown)
    CheckEnv(CheckEnvArgs),
}

/// Arguments for the `serve` subcommand
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Serve over TCP on this address instead of stdio, e.g. 127.0.0.1:7400
    #[arg(long)]
    pub listen: Option<String>,

    /// Session policy: lazy (log in from the environment on first use) or explicit
    #[arg(long = "auth-policy", value_parser = clap::value_parser!(AuthPolicy))]
    pub auth_policy: Option<AuthPolicy>,

    /// Tool call timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Arguments for the `config` subcommand
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `check-env` subcommand
#[derive(Args, Debug, Default)]
pub struct CheckEnvArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from([
            "bsky-mcp",
            "--config",
            "/tmp/x.toml",
            "serve",
            "--listen",
            "127.0.0.1:7400",
            "--auth-policy",
            "explicit",
            "--timeout",
            "15",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.listen.as_deref(), Some("127.0.0.1:7400"));
        assert_eq!(args.auth_policy, Some(AuthPolicy::Explicit));
        assert_eq!(args.timeout, Some(15));
    }

    #[test]
    fn bad_auth_policy_is_rejected() {
        assert!(Cli::try_parse_from(["bsky-mcp", "serve", "--auth-policy", "sometimes"]).is_err());
    }

    #[test]
    fn check_env_subcommand_name() {
        let cli = Cli::try_parse_from(["bsky-mcp", "check-env", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckEnv(CheckEnvArgs { json: true })));
    }
}
