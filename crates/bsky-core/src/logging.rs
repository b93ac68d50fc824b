//! Shared logging initialization for bsky-mcp binaries.
//!
//! Output always goes to stderr: stdout carries the MCP protocol stream when
//! the server runs over stdio.

use std::sync::OnceLock;

/// Environment variable selecting the log level.
pub const LOG_ENV: &str = "BSKY_MCP_LOG";

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level(raw: Option<&str>) -> tracing::Level {
    match raw.unwrap_or("info").trim().to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Initialize process-level tracing output from `BSKY_MCP_LOG`.
///
/// Safe to call multiple times; only the first call installs the subscriber.
/// Best-effort: a subscriber installed elsewhere (e.g. by a test harness) is
/// left in place.
pub fn init() {
    if INIT.get().is_some() {
        return;
    }
    let level = parse_level(std::env::var(LOG_ENV).ok().as_deref());
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    let _ = INIT.set(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn parse_level_defaults_to_info() {
        assert_eq!(parse_level(None), tracing::Level::INFO);
        assert_eq!(parse_level(Some("bogus")), tracing::Level::INFO);
    }

    #[test]
    fn parse_level_is_case_insensitive() {
        assert_eq!(parse_level(Some("DEBUG")), tracing::Level::DEBUG);
        assert_eq!(parse_level(Some(" warn ")), tracing::Level::WARN);
        assert_eq!(parse_level(Some("Trace")), tracing::Level::TRACE);
        assert_eq!(parse_level(Some("error")), tracing::Level::ERROR);
    }

    #[test]
    #[serial]
    fn init_is_idempotent() {
        unsafe {
            std::env::set_var(LOG_ENV, "debug");
        }
        init();
        init();
        assert!(INIT.get().is_some());
        unsafe {
            std::env::remove_var(LOG_ENV);
        }
    }
}
