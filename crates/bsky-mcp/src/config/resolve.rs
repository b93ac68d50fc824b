//! Config resolution for bsky-mcp.
//!
//! Resolves [`BskyMcpConfig`] from multiple sources with the following priority
//! (highest to lowest):
//!
//! 1. CLI flags (applied by the caller after [`resolve_config`] returns)
//! 2. Environment variables (`BSKY_MCP_*`)
//! 3. `--config <path>` if given, otherwise `./bsky-mcp.toml`
//! 4. Global `<config_dir>/bsky-mcp/config.toml`
//! 5. Compiled-in defaults (via [`BskyMcpConfig::default`])
//!
//! Files are merged key by key, so a local file only needs the keys it changes.

use super::types::{AuthPolicy, BskyMcpConfig, ConfigError};
use std::path::{Path, PathBuf};

/// Name of the repo-local config file.
pub const CONFIG_FILE_NAME: &str = "bsky-mcp.toml";

/// Resolve the complete configuration.
///
/// # Arguments
///
/// * `config_path` – Optional explicit config file. When `None`,
///   `./bsky-mcp.toml` is used if it exists.
///
/// # Errors
///
/// Returns an error if an explicit `config_path` cannot be read, if any file
/// present is malformed, or if `BSKY_MCP_AUTH_POLICY` names an unknown policy.
pub fn resolve_config(config_path: Option<&Path>) -> Result<BskyMcpConfig, ConfigError> {
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let global = dirs::config_dir().map(|d| d.join("bsky-mcp").join("config.toml"));
    let mut cfg = resolve_files(config_path, &current_dir, global.as_deref())?;
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

/// Merge the global and local files over defaults.
fn resolve_files(
    explicit: Option<&Path>,
    current_dir: &Path,
    global: Option<&Path>,
) -> Result<BskyMcpConfig, ConfigError> {
    let mut merged = toml::Table::new();

    if let Some(path) = global {
        if let Some(table) = load_table(path, false)? {
            merged.extend(table);
        }
    }

    let local = match explicit {
        Some(path) => load_table(path, true)?,
        None => load_table(&current_dir.join(CONFIG_FILE_NAME), false)?,
    };
    if let Some(table) = local {
        merged.extend(table);
    }

    Ok(toml::Value::Table(merged).try_into::<BskyMcpConfig>()?)
}

/// Read and parse one TOML file. A missing file is `Ok(None)` unless `required`.
fn load_table(path: &Path, required: bool) -> Result<Option<toml::Table>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let table = contents
        .parse::<toml::Table>()
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(Some(table))
}

/// Apply `BSKY_MCP_*` environment variable overrides to `cfg`.
///
/// Empty string values are treated as "not set" and do not override existing
/// configuration. Unparseable numbers are ignored.
fn apply_env_overrides(cfg: &mut BskyMcpConfig) -> Result<(), ConfigError> {
    if let Ok(v) = std::env::var("BSKY_MCP_AUTH_POLICY") {
        if !v.is_empty() {
            cfg.auth_policy = v.parse::<AuthPolicy>()?;
        }
    }
    if let Ok(v) = std::env::var("BSKY_MCP_REQUEST_TIMEOUT_SECS") {
        if let Ok(secs) = v.trim().parse::<u64>() {
            cfg.request_timeout_secs = secs;
        }
    }
    if let Ok(v) = std::env::var("BSKY_MCP_HTTP_TIMEOUT_SECS") {
        if let Ok(secs) = v.trim().parse::<u64>() {
            cfg.http_timeout_secs = secs;
        }
    }
    if let Ok(v) = std::env::var("BSKY_MCP_PUBLIC_ENDPOINT") {
        if !v.is_empty() {
            cfg.public_endpoint = v;
        }
    }
    if let Ok(v) = std::env::var("BSKY_MCP_USER_AGENT") {
        if !v.is_empty() {
            cfg.user_agent = v;
        }
    }
    if let Ok(v) = std::env::var("BSKY_MCP_LISTEN") {
        if !v.is_empty() {
            cfg.listen = Some(v);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    // ─── Defaults and TOML ──────────────────────────────────────────────────

    #[test]
    fn test_defaults() {
        let cfg = BskyMcpConfig::default();
        assert_eq!(cfg.auth_policy, AuthPolicy::Lazy);
        assert_eq!(cfg.request_timeout_secs, 60);
        assert_eq!(cfg.http_timeout_secs, 30);
        assert_eq!(cfg.public_endpoint, "https://public.api.bsky.app");
        assert!(cfg.user_agent.starts_with("bsky-mcp/"));
        assert!(cfg.listen.is_none());
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let cfg: BskyMcpConfig = toml::from_str("auth_policy = \"explicit\"\n").unwrap();
        assert_eq!(cfg.auth_policy, AuthPolicy::Explicit);
        assert_eq!(cfg.request_timeout_secs, 60);
    }

    #[test]
    fn test_toml_rejects_unknown_policy() {
        assert!(toml::from_str::<BskyMcpConfig>("auth_policy = \"eager\"\n").is_err());
    }

    #[test]
    fn test_auth_policy_from_str() {
        assert_eq!("LAZY".parse::<AuthPolicy>().unwrap(), AuthPolicy::Lazy);
        assert_eq!(" explicit ".parse::<AuthPolicy>().unwrap(), AuthPolicy::Explicit);
        assert!(matches!(
            "sometimes".parse::<AuthPolicy>(),
            Err(ConfigError::InvalidAuthPolicy(_))
        ));
    }

    // ─── File layering ──────────────────────────────────────────────────────

    #[test]
    fn test_no_files_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = resolve_files(None, dir.path(), Some(&dir.path().join("missing.toml"))).unwrap();
        assert_eq!(cfg, BskyMcpConfig::default());
    }

    #[test]
    fn test_local_overrides_global_per_key() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("global.toml");
        std::fs::write(&global, "request_timeout_secs = 10\nhttp_timeout_secs = 5\n").unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "request_timeout_secs = 20\n").unwrap();

        let cfg = resolve_files(None, dir.path(), Some(&global)).unwrap();
        assert_eq!(cfg.request_timeout_secs, 20);
        assert_eq!(cfg.http_timeout_secs, 5);
    }

    #[test]
    fn test_explicit_path_replaces_local_lookup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "listen = \"ignored:1\"\n").unwrap();
        let explicit = dir.path().join("custom.toml");
        std::fs::write(&explicit, "listen = \"127.0.0.1:7400\"\n").unwrap();

        let cfg = resolve_files(Some(&explicit), dir.path(), None).unwrap();
        assert_eq!(cfg.listen.as_deref(), Some("127.0.0.1:7400"));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_files(Some(&dir.path().join("nope.toml")), dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "this is = = not toml").unwrap();
        let err = resolve_files(None, dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "request_timeout_secs = \"soon\"\n").unwrap();
        let err = resolve_files(None, dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    // ─── Environment variable overrides ─────────────────────────────────────

    fn clear_env() {
        for key in [
            "BSKY_MCP_AUTH_POLICY",
            "BSKY_MCP_REQUEST_TIMEOUT_SECS",
            "BSKY_MCP_HTTP_TIMEOUT_SECS",
            "BSKY_MCP_PUBLIC_ENDPOINT",
            "BSKY_MCP_USER_AGENT",
            "BSKY_MCP_LISTEN",
        ] {
            unsafe {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_env_auth_policy_override() {
        clear_env();
        unsafe {
            env::set_var("BSKY_MCP_AUTH_POLICY", "explicit");
        }
        let mut cfg = BskyMcpConfig::default();
        apply_env_overrides(&mut cfg).unwrap();
        assert_eq!(cfg.auth_policy, AuthPolicy::Explicit);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_invalid_auth_policy_is_error() {
        clear_env();
        unsafe {
            env::set_var("BSKY_MCP_AUTH_POLICY", "whenever");
        }
        let mut cfg = BskyMcpConfig::default();
        assert!(apply_env_overrides(&mut cfg).is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_numeric_overrides() {
        clear_env();
        unsafe {
            env::set_var("BSKY_MCP_REQUEST_TIMEOUT_SECS", "15");
            env::set_var("BSKY_MCP_HTTP_TIMEOUT_SECS", "not-a-number");
        }
        let mut cfg = BskyMcpConfig::default();
        apply_env_overrides(&mut cfg).unwrap();
        assert_eq!(cfg.request_timeout_secs, 15);
        assert_eq!(cfg.http_timeout_secs, 30);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_env_does_not_override() {
        clear_env();
        unsafe {
            env::set_var("BSKY_MCP_LISTEN", "");
            env::set_var("BSKY_MCP_AUTH_POLICY", "");
        }
        let mut cfg = BskyMcpConfig {
            listen: Some("0.0.0.0:9000".to_string()),
            ..Default::default()
        };
        apply_env_overrides(&mut cfg).unwrap();
        assert_eq!(cfg.listen.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(cfg.auth_policy, AuthPolicy::Lazy);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_string_overrides() {
        clear_env();
        unsafe {
            env::set_var("BSKY_MCP_PUBLIC_ENDPOINT", "https://appview.example.com");
            env::set_var("BSKY_MCP_USER_AGENT", "custom/1.0");
        }
        let mut cfg = BskyMcpConfig::default();
        apply_env_overrides(&mut cfg).unwrap();
        assert_eq!(cfg.public_endpoint, "https://appview.example.com");
        assert_eq!(cfg.user_agent, "custom/1.0");
        clear_env();
    }
}
