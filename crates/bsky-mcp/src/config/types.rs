//! Configuration types for bsky-mcp.
//!
//! [`BskyMcpConfig`] is deserialized from `bsky-mcp.toml`. Every field has a
//! default so a missing or empty file yields a working configuration.
//! Credentials are deliberately absent: they come from `IDENTITY_*` variables
//! or the `login` tool only.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How protected tools obtain a session when none exists yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPolicy {
    /// Log in from `IDENTITY_HANDLE` / `IDENTITY_SECRET` on first use.
    #[default]
    Lazy,
    /// Require an explicit `login` tool call first.
    Explicit,
}

impl AuthPolicy {
    /// Lowercase name as used in config files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lazy => "lazy",
            Self::Explicit => "explicit",
        }
    }
}

impl fmt::Display for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy" => Ok(Self::Lazy),
            "explicit" => Ok(Self::Explicit),
            other => Err(ConfigError::InvalidAuthPolicy(other.to_string())),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid TOML or has fields of the wrong type.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// Merged configuration does not deserialize.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] toml::de::Error),

    /// `auth_policy` is neither `lazy` nor `explicit`.
    #[error("invalid auth policy '{0}' (expected 'lazy' or 'explicit')")]
    InvalidAuthPolicy(String),
}

/// Resolved bsky-mcp configuration.
///
/// # Example `bsky-mcp.toml`
///
/// ```toml
/// auth_policy = "explicit"
/// request_timeout_secs = 30
/// listen = "127.0.0.1:7400"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BskyMcpConfig {
    /// Session acquisition policy (default: `lazy`)
    #[serde(default)]
    pub auth_policy: AuthPolicy,

    /// Upper bound on one tool call, in seconds (default: `60`)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per-HTTP-request timeout, in seconds (default: `30`)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Unauthenticated AppView for public lookups
    #[serde(default = "default_public_endpoint")]
    pub public_endpoint: String,

    /// `User-Agent` sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// TCP address to serve on instead of stdio
    #[serde(default)]
    pub listen: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_public_endpoint() -> String {
    bsky_mcp_core::xrpc::DEFAULT_PUBLIC_SERVICE.to_string()
}

fn default_user_agent() -> String {
    concat!("bsky-mcp/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for BskyMcpConfig {
    fn default() -> Self {
        Self {
            auth_policy: AuthPolicy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            public_endpoint: default_public_endpoint(),
            user_agent: default_user_agent(),
            listen: None,
        }
    }
}
