//! Authentication gate in front of every protected tool.
//!
//! [`AuthGate::run`] looks up the caller's session handle and, when there is
//! none, performs at most one lazy login from the environment (under
//! [`AuthPolicy::Lazy`]) before invoking the [`ProtectedOperation`]. If no
//! handle can be obtained the operation is never invoked and an error
//! envelope is returned instead.
//!
//! The explicit session operations (`login`, `logout`, `status`) live here
//! too, so every transition of a session's state goes through one type.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::client::{ClientFactory, ClientHandle};
use crate::config::AuthPolicy;
use crate::credentials::{self, EnvSource, IDENTITY_HANDLE, IDENTITY_SECRET, SERVICE_ENDPOINT};
use crate::envelope::Envelope;
use crate::error::{AuthError, ToolError};
use crate::params::Args;
use crate::session::{SessionKey, SessionRegistry};

/// A tool body that needs an authenticated client.
#[async_trait]
pub trait ProtectedOperation: Send + Sync {
    /// Tool name, for logging.
    fn name(&self) -> &str;

    /// Run against an authenticated `client`.
    async fn execute(&self, client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError>;
}

/// Session-aware authentication gate.
pub struct AuthGate {
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn ClientFactory>,
    env: Arc<dyn EnvSource>,
    policy: AuthPolicy,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AuthGate {
    /// Gate with a fresh registry.
    pub fn new(factory: Arc<dyn ClientFactory>, env: Arc<dyn EnvSource>, policy: AuthPolicy) -> Self {
        Self::with_registry(Arc::new(SessionRegistry::new()), factory, env, policy)
    }

    /// Gate over an existing registry.
    pub fn with_registry(
        registry: Arc<SessionRegistry>,
        factory: Arc<dyn ClientFactory>,
        env: Arc<dyn EnvSource>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            registry,
            factory,
            env,
            policy,
        }
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Client factory, for unauthenticated lookups.
    pub fn factory(&self) -> &Arc<dyn ClientFactory> {
        &self.factory
    }

    /// Configured policy.
    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    /// Handle for `key`, logging in lazily if policy allows.
    ///
    /// A concurrent lazy login that loses the race to insert has its handle
    /// closed and the winner's handle is returned.
    pub async fn acquire(&self, key: &SessionKey) -> Result<ClientHandle, AuthError> {
        if let Some(handle) = self.registry.get(key) {
            return Ok(handle);
        }
        if self.policy == AuthPolicy::Explicit {
            return Err(AuthError::NotAuthenticated);
        }

        let credential = credentials::resolve_from_environment(self.env.as_ref())?;
        tracing::info!(
            session = %key,
            identifier = %credential.identifier(),
            endpoint = %credential.service_endpoint(),
            "lazy login from environment"
        );
        let handle = self.factory.authenticate(&credential).await?;
        if self.registry.insert_if_absent(key, handle.clone()) {
            return Ok(handle);
        }

        tracing::debug!(session = %key, "session authenticated concurrently; discarding lazy handle");
        handle.close().await;
        self.registry.get(key).ok_or(AuthError::NotAuthenticated)
    }

    /// Run `op` for `key`, authenticating first if needed.
    pub async fn run(&self, key: &SessionKey, op: &dyn ProtectedOperation, args: &Args) -> Envelope {
        let client = match self.acquire(key).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(session = %key, tool = op.name(), kind = e.kind(), "authentication unavailable");
                return Envelope::Error {
                    message: format!("Authentication required. {e}"),
                    kind: Some(e.kind()),
                };
            }
        };

        match op.execute(&client, args).await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(session = %key, tool = op.name(), error = %e, "tool failed");
                if e.invalidates_session() && self.registry.remove_if_same(key, &client) {
                    tracing::info!(session = %key, "session rejected upstream; handle discarded");
                    return Envelope::Error {
                        message: format!("{e}. The session is no longer valid; log in again."),
                        kind: Some(e.kind()),
                    };
                }
                e.into()
            }
        }
    }

    /// Explicit login. Replaces any existing handle on success.
    pub async fn login(
        &self,
        key: &SessionKey,
        identifier: Option<&str>,
        secret: Option<&str>,
        endpoint: Option<&str>,
    ) -> Envelope {
        let credential = match credentials::resolve_explicit(identifier, secret, endpoint) {
            Ok(c) => c,
            Err(e) => return ToolError::from(e).into(),
        };
        let handle = match self.factory.authenticate(&credential).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(session = %key, identifier = %credential.identifier(), "login rejected");
                return ToolError::from(e).into();
            }
        };

        let identity = handle.identity().clone();
        self.registry.put(key, handle).await;
        tracing::info!(session = %key, handle = %identity.handle, did = %identity.did, "logged in");
        Envelope::ok(json!({
            "message": format!("Logged in as {}", identity.display_handle()),
            "handle": identity.display_handle(),
            "did": identity.did,
        }))
    }

    /// Drop the session's handle. Errors when there was none.
    pub async fn logout(&self, key: &SessionKey) -> Envelope {
        if self.registry.remove(key).await {
            tracing::info!(session = %key, "logged out");
            Envelope::ok(json!({ "message": "Logged out successfully" }))
        } else {
            Envelope::Error {
                message: "Not logged in".to_string(),
                kind: Some(AuthError::NotAuthenticated.kind()),
            }
        }
    }

    /// Describe the session's authentication state.
    pub fn status(&self, key: &SessionKey) -> Envelope {
        if let Some(handle) = self.registry.get(key) {
            let identity = handle.identity();
            return Envelope::ok(json!({
                "authenticated": true,
                "handle": identity.display_handle(),
                "did": identity.did,
                "service_endpoint": identity.service_endpoint,
                "authenticated_at": identity.authenticated_at.to_rfc3339(),
                "message": format!("Authenticated as {}", identity.display_handle()),
            }));
        }

        let report = credentials::environment_report(self.env.as_ref());
        let message = match self.policy {
            AuthPolicy::Explicit => {
                "Not authenticated. Call the login tool with your handle and app password.".to_string()
            }
            AuthPolicy::Lazy if report.lazy_login_possible => format!(
                "Not authenticated yet. Credentials for {} were found in the environment; \
                 the first protected call will log in to {}.",
                report.identity_handle.as_deref().unwrap_or_default(),
                report.effective_endpoint
            ),
            AuthPolicy::Lazy => format!(
                "Not authenticated and no credentials configured. Set {IDENTITY_HANDLE} and \
                 {IDENTITY_SECRET}, or call the login tool."
            ),
        };
        Envelope::ok(json!({
            "authenticated": false,
            "auth_policy": self.policy.as_str(),
            "message": message,
        }))
    }

    /// Report which credential variables are set, without secret values.
    pub fn environment(&self) -> Envelope {
        let report = credentials::environment_report(self.env.as_ref());
        let message = if report.lazy_login_possible {
            "Credentials found in environment"
        } else {
            "Credentials incomplete: IDENTITY_HANDLE and IDENTITY_SECRET are both required"
        };
        let set = |present: bool| if present { "set" } else { "not set" };
        let endpoint = match &report.service_endpoint {
            Some(url) => format!("set to {url}"),
            None => format!("not set (defaults to {})", report.effective_endpoint),
        };
        Envelope::ok(json!({
            "message": message,
            "variables": {
                IDENTITY_HANDLE: set(report.identity_handle.is_some()),
                IDENTITY_SECRET: set(report.identity_secret_set),
                SERVICE_ENDPOINT: endpoint,
            },
            "environment": report,
            "auth_policy": self.policy.as_str(),
        }))
    }

    /// Tear down `key` when its connection ends.
    pub async fn end_session(&self, key: &SessionKey) {
        if self.registry.remove(key).await {
            tracing::debug!(session = %key, "session ended; handle released");
        }
    }
}
