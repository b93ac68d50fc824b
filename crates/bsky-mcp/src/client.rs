//! Authenticated client handles and the factory that creates them.
//!
//! [`SocialGraphClient`] is the seam between the tools and the network: the
//! production implementation wraps an [`XrpcClient`] holding one account
//! session, and the `testing` module (feature `test-support`) provides a
//! scripted stand-in.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bsky_mcp_core::reqwest;
use bsky_mcp_core::xrpc::{HttpSettings, build_http_client};
use bsky_mcp_core::{XrpcClient, XrpcError};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::BskyMcpConfig;
use crate::credentials::Credential;
use crate::error::AuthError;

/// Who a handle is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Account handle, without a leading `@`.
    pub handle: String,
    /// Account DID.
    pub did: String,
    /// Service the session lives on.
    pub service_endpoint: String,
    /// When the login completed.
    pub authenticated_at: DateTime<Utc>,
}

impl Identity {
    /// `@handle` form for user-facing messages.
    pub fn display_handle(&self) -> String {
        format!("@{}", self.handle)
    }
}

/// One authenticated connection to the remote service.
#[async_trait]
pub trait SocialGraphClient: Send + Sync {
    /// Identity established at login.
    fn identity(&self) -> &Identity;

    /// XRPC query (GET).
    async fn query(&self, nsid: &str, params: &[(String, String)]) -> Result<Value, XrpcError>;

    /// XRPC procedure (POST).
    async fn procedure(&self, nsid: &str, body: Option<Value>) -> Result<Value, XrpcError>;

    /// Tear down the remote session. Best effort; never fails.
    async fn close(&self);
}

/// Shared reference to an authenticated client.
pub type ClientHandle = Arc<dyn SocialGraphClient>;

/// Performs logins and the few unauthenticated lookups.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Log in once with `credential`. Never retries.
    async fn authenticate(&self, credential: &Credential) -> Result<ClientHandle, AuthError>;

    /// Resolve a handle to a DID without any session.
    async fn resolve_handle_public(&self, handle: &str) -> Result<String, XrpcError>;
}

/// [`SocialGraphClient`] backed by a live XRPC session.
#[derive(Debug)]
pub struct XrpcSession {
    client: XrpcClient,
    identity: Identity,
}

#[async_trait]
impl SocialGraphClient for XrpcSession {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn query(&self, nsid: &str, params: &[(String, String)]) -> Result<Value, XrpcError> {
        self.client.query(nsid, params).await
    }

    async fn procedure(&self, nsid: &str, body: Option<Value>) -> Result<Value, XrpcError> {
        self.client.procedure(nsid, body.as_ref()).await
    }

    async fn close(&self) {
        match self.client.delete_session().await {
            Ok(()) => tracing::info!(handle = %self.identity.handle, "remote session deleted"),
            Err(e) => {
                tracing::warn!(handle = %self.identity.handle, error = %e, "failed to delete remote session")
            }
        }
    }
}

/// Production [`ClientFactory`] sharing one HTTP connection pool.
#[derive(Debug)]
pub struct XrpcClientFactory {
    http: reqwest::Client,
    public: XrpcClient,
}

impl XrpcClientFactory {
    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built or `public_endpoint` is not a
    /// valid URL.
    pub fn from_config(config: &BskyMcpConfig) -> Result<Self, XrpcError> {
        let settings = HttpSettings {
            timeout: Duration::from_secs(config.http_timeout_secs.max(1)),
            user_agent: config.user_agent.clone(),
        };
        let http = build_http_client(&settings)?;
        let public = XrpcClient::new(http.clone(), &config.public_endpoint)?;
        Ok(Self { http, public })
    }
}

#[async_trait]
impl ClientFactory for XrpcClientFactory {
    async fn authenticate(&self, credential: &Credential) -> Result<ClientHandle, AuthError> {
        let client = XrpcClient::new(self.http.clone(), credential.service_endpoint())?;
        let tokens = client
            .create_session(credential.identifier(), credential.secret())
            .await?;
        let identity = Identity {
            handle: tokens.handle,
            did: tokens.did,
            service_endpoint: client.endpoint().to_string(),
            authenticated_at: Utc::now(),
        };
        Ok(Arc::new(XrpcSession { client, identity }))
    }

    async fn resolve_handle_public(&self, handle: &str) -> Result<String, XrpcError> {
        self.public.resolve_handle(handle).await
    }
}
