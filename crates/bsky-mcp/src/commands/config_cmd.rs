//! `config` subcommand: show resolved configuration.
//!
//! Loads the full resolved configuration and prints it either as JSON
//! (`--json`) or as a human-readable key=value table.

use crate::cli::ConfigArgs;
use crate::config::{BskyMcpConfig, resolve_config};
use std::path::PathBuf;

/// Run the `config` subcommand.
///
/// # Errors
///
/// Returns an error if config resolution fails (e.g., unreadable or
/// malformed TOML file).
pub async fn run(config_path: &Option<PathBuf>, args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = resolve_config(config_path.as_deref())?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
    } else {
        print!("{}", render(&cfg));
    }
    Ok(())
}

fn render(cfg: &BskyMcpConfig) -> String {
    let mut out = String::from("bsky-mcp configuration:\n");
    out.push_str(&format!("  auth_policy          = {}\n", cfg.auth_policy));
    out.push_str(&format!("  request_timeout_secs = {}\n", cfg.request_timeout_secs));
    out.push_str(&format!("  http_timeout_secs    = {}\n", cfg.http_timeout_secs));
    out.push_str(&format!("  public_endpoint      = {}\n", cfg.public_endpoint));
    out.push_str(&format!("  user_agent           = {}\n", cfg.user_agent));
    out.push_str(&format!(
        "  listen               = {}\n",
        cfg.listen.as_deref().unwrap_or("<stdio>")
    ));
    out
}
