//! `serve` subcommand: start the MCP server.
//!
//! Serves one session on stdin/stdout, or one session per TCP connection
//! when a listen address is configured. See [`crate::server`] for request
//! handling and [`crate::framing`] for framing details.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::cli::ServeArgs;
use crate::client::XrpcClientFactory;
use crate::config::{BskyMcpConfig, resolve_config};
use crate::credentials::{ProcessEnv, environment_report};
use crate::gate::AuthGate;
use crate::server::McpServer;

/// Run the `serve` subcommand.
///
/// Resolves configuration, applies CLI overrides, then serves until stdin
/// EOF (stdio) or Ctrl-C (TCP).
///
/// # Errors
///
/// Returns an error if configuration resolution fails, the HTTP client
/// cannot be built, the listener cannot bind, or the stdio loop hits an
/// unrecoverable I/O error.
pub async fn run(config_path: &Option<PathBuf>, args: ServeArgs) -> anyhow::Result<()> {
    let mut config = resolve_config(config_path.as_deref())?;
    apply_overrides(&mut config, &args);

    let factory = XrpcClientFactory::from_config(&config).context("failed to build HTTP client")?;
    let env = Arc::new(ProcessEnv);
    let report = environment_report(env.as_ref());
    tracing::info!(
        auth_policy = %config.auth_policy,
        lazy_login_possible = report.lazy_login_possible,
        endpoint = %report.effective_endpoint,
        "starting bsky-mcp"
    );

    let gate = Arc::new(AuthGate::new(Arc::new(factory), env, config.auth_policy));
    let server = Arc::new(McpServer::new(
        gate,
        Duration::from_secs(config.request_timeout_secs.max(1)),
    ));

    match config.listen.as_deref() {
        None => server.serve_stdio().await,
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            tracing::info!(addr = %listener.local_addr()?, "listening");
            tokio::select! {
                result = Arc::clone(&server).serve_tcp(listener) => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, shutting down");
                    Ok(())
                }
            }
        }
    }
}

/// CLI flags take precedence over every other source.
fn apply_overrides(config: &mut BskyMcpConfig, args: &ServeArgs) {
    if let Some(ref listen) = args.listen {
        config.listen = Some(listen.clone());
    }
    if let Some(policy) = args.auth_policy {
        config.auth_policy = policy;
    }
    if let Some(timeout_secs) = args.timeout {
        config.request_timeout_secs = timeout_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthPolicy;

    #[test]
    fn flags_override_config() {
        let mut config = BskyMcpConfig::default();
        let args = ServeArgs {
            listen: Some("127.0.0.1:0".to_string()),
            auth_policy: Some(AuthPolicy::Explicit),
            timeout: Some(5),
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.listen.as_deref(), Some("127.0.0.1:0"));
        assert_eq!(config.auth_policy, AuthPolicy::Explicit);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn absent_flags_keep_config() {
        let mut config = BskyMcpConfig {
            request_timeout_secs: 90,
            ..Default::default()
        };
        apply_overrides(&mut config, &ServeArgs::default());
        assert_eq!(config.request_timeout_secs, 90);
        assert_eq!(config.auth_policy, AuthPolicy::Lazy);
        assert!(config.listen.is_none());
    }
}
