//! Credential resolution from explicit input or the process environment.
//!
//! Environment access goes through [`EnvSource`] so the lazy-login path can
//! be exercised without touching real process state.

use std::collections::HashMap;
use std::fmt;

use bsky_mcp_core::xrpc::DEFAULT_SERVICE;
use serde::Serialize;

use crate::error::AuthError;

/// Login identifier (handle or email).
pub const IDENTITY_HANDLE: &str = "IDENTITY_HANDLE";
/// Login secret (app password).
pub const IDENTITY_SECRET: &str = "IDENTITY_SECRET";
/// Service endpoint; defaults to [`DEFAULT_SERVICE`].
pub const SERVICE_ENDPOINT: &str = "SERVICE_ENDPOINT";

/// Lookup of environment-style variables.
pub trait EnvSource: Send + Sync {
    /// Value of `key`, or `None` when unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed variable set, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    /// Empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Resolved login material. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    identifier: String,
    secret: String,
    service_endpoint: String,
}

impl Credential {
    /// Login identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Login secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Service to log in against.
    pub fn service_endpoint(&self) -> &str {
        &self.service_endpoint
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .field("service_endpoint", &self.service_endpoint)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Build a credential from caller-supplied values.
///
/// # Errors
///
/// [`AuthError::MissingCredentials`] naming the first blank field.
pub fn resolve_explicit(
    identifier: Option<&str>,
    secret: Option<&str>,
    endpoint: Option<&str>,
) -> Result<Credential, AuthError> {
    let identifier = non_blank(identifier.map(str::to_string))
        .ok_or_else(|| AuthError::missing("identifier"))?;
    let secret =
        non_blank(secret.map(str::to_string)).ok_or_else(|| AuthError::missing("secret"))?;
    let service_endpoint = non_blank(endpoint.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_SERVICE.to_string());
    Ok(Credential {
        identifier: identifier.trim_start_matches('@').to_string(),
        secret,
        service_endpoint,
    })
}

/// Build a credential from `IDENTITY_HANDLE`, `IDENTITY_SECRET` and
/// `SERVICE_ENDPOINT`. Empty values count as unset.
///
/// # Errors
///
/// [`AuthError::MissingCredentials`] naming the first missing variable.
pub fn resolve_from_environment(env: &dyn EnvSource) -> Result<Credential, AuthError> {
    let identifier =
        non_blank(env.var(IDENTITY_HANDLE)).ok_or_else(|| AuthError::missing(IDENTITY_HANDLE))?;
    let secret =
        non_blank(env.var(IDENTITY_SECRET)).ok_or_else(|| AuthError::missing(IDENTITY_SECRET))?;
    let endpoint = non_blank(env.var(SERVICE_ENDPOINT));
    resolve_explicit(Some(&identifier), Some(&secret), endpoint.as_deref())
}

/// Which credential variables are present. Never carries secret values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    /// The login identifier, if set (not secret).
    pub identity_handle: Option<String>,
    /// Whether a secret is set.
    pub identity_secret_set: bool,
    /// Configured endpoint, if set.
    pub service_endpoint: Option<String>,
    /// Endpoint a lazy login would use.
    pub effective_endpoint: String,
    /// `true` when a lazy login could be attempted.
    pub lazy_login_possible: bool,
}

/// Describe the credential environment.
pub fn environment_report(env: &dyn EnvSource) -> EnvironmentReport {
    let identity_handle = non_blank(env.var(IDENTITY_HANDLE));
    let identity_secret_set = non_blank(env.var(IDENTITY_SECRET)).is_some();
    let service_endpoint = non_blank(env.var(SERVICE_ENDPOINT));
    EnvironmentReport {
        lazy_login_possible: identity_handle.is_some() && identity_secret_set,
        effective_endpoint: service_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
        identity_handle,
        identity_secret_set,
        service_endpoint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_defaults_endpoint() {
        let cred = resolve_explicit(Some("alice.test"), Some("pw"), None).unwrap();
        assert_eq!(cred.identifier(), "alice.test");
        assert_eq!(cred.secret(), "pw");
        assert_eq!(cred.service_endpoint(), "https://bsky.social");
    }

    #[test]
    fn explicit_strips_at_prefix_and_whitespace() {
        let cred =
            resolve_explicit(Some("  @alice.test "), Some("pw"), Some(" https://pds.example ")).unwrap();
        assert_eq!(cred.identifier(), "alice.test");
        assert_eq!(cred.service_endpoint(), "https://pds.example");
    }

    #[test]
    fn explicit_blank_fields_are_missing() {
        let err = resolve_explicit(Some("  "), Some("pw"), None).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials { ref field } if field == "identifier"));
        let err = resolve_explicit(Some("alice"), None, None).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials { ref field } if field == "secret"));
    }

    #[test]
    fn environment_requires_handle_and_secret() {
        let err = resolve_from_environment(&MapEnv::new()).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials { ref field } if field == IDENTITY_HANDLE));

        let env = MapEnv::new().with(IDENTITY_HANDLE, "alice.test").with(IDENTITY_SECRET, "");
        let err = resolve_from_environment(&env).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials { ref field } if field == IDENTITY_SECRET));
    }

    #[test]
    fn environment_empty_endpoint_uses_default() {
        let env = MapEnv::new()
            .with(IDENTITY_HANDLE, "alice.test")
            .with(IDENTITY_SECRET, "pw")
            .with(SERVICE_ENDPOINT, "");
        let cred = resolve_from_environment(&env).unwrap();
        assert_eq!(cred.service_endpoint(), DEFAULT_SERVICE);
    }

    #[test]
    fn debug_never_shows_secret() {
        let cred = resolve_explicit(Some("alice"), Some("hunter2"), None).unwrap();
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn report_omits_secret_value() {
        let env = MapEnv::new()
            .with(IDENTITY_HANDLE, "alice.test")
            .with(IDENTITY_SECRET, "hunter2");
        let report = environment_report(&env);
        assert!(report.lazy_login_possible);
        assert!(report.identity_secret_set);
        assert_eq!(report.effective_endpoint, DEFAULT_SERVICE);
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn report_without_secret_blocks_lazy_login() {
        let env = MapEnv::new().with(IDENTITY_HANDLE, "alice.test");
        let report = environment_report(&env);
        assert!(!report.lazy_login_possible);
        assert!(!report.identity_secret_set);
    }
}
