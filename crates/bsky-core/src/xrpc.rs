//! Minimal XRPC client for an AT Protocol service (PDS or AppView).
//!
//! [`XrpcClient`] speaks the two XRPC verbs, `query` (HTTP GET) and
//! `procedure` (HTTP POST), and carries the account session created by
//! [`XrpcClient::create_session`]. Requests made while a session is held are
//! sent with the access token; an `ExpiredToken` response triggers exactly
//! one `refreshSession` followed by a single replay of the request.
//!
//! Only the handful of endpoints the MCP tools need are given dedicated
//! methods. Everything else goes through [`XrpcClient::query`] and
//! [`XrpcClient::procedure`] with the NSID spelled out by the caller.

use std::fmt;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::RwLock;

/// Canonical service used when no endpoint is configured.
pub const DEFAULT_SERVICE: &str = "https://bsky.social";

/// Unauthenticated AppView used for public lookups (handle resolution).
pub const DEFAULT_PUBLIC_SERVICE: &str = "https://public.api.bsky.app";

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
const DELETE_SESSION: &str = "com.atproto.server.deleteSession";
const RESOLVE_HANDLE: &str = "com.atproto.identity.resolveHandle";

/// Errors produced by [`XrpcClient`] calls.
#[derive(Debug, Error)]
pub enum XrpcError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-2xx status and an XRPC error body.
    #[error("{error} (HTTP {status}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// XRPC error name, e.g. `InvalidRequest` or `ExpiredToken`.
        error: String,
        /// Human-readable message from the service (may be empty).
        message: String,
    },

    /// A 2xx response whose body did not have the expected shape.
    #[error("unexpected response from {nsid}: {detail}")]
    Decode {
        /// Endpoint that produced the response.
        nsid: String,
        /// What was wrong with it.
        detail: String,
    },

    /// The configured service endpoint is not a valid absolute URL.
    #[error("invalid service endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint string.
        endpoint: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// An authenticated call was attempted without a session.
    #[error("no active session")]
    NoSession,
}

impl XrpcError {
    /// XRPC error name for remote failures, `None` otherwise.
    pub fn error_name(&self) -> Option<&str> {
        match self {
            Self::Remote { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }

    /// `true` when the access token has expired and a refresh may help.
    pub fn is_expired_token(&self) -> bool {
        self.error_name() == Some("ExpiredToken")
    }

    /// `true` when the failure means the session itself is no longer usable.
    ///
    /// Ordinary request failures (bad parameters, missing records, rate
    /// limits, network errors) leave the session intact.
    pub fn is_session_invalid(&self) -> bool {
        match self {
            Self::NoSession => true,
            Self::Remote { status, error, .. } => {
                matches!(
                    error.as_str(),
                    "InvalidToken" | "ExpiredToken" | "AuthenticationRequired" | "AccountTakedown"
                ) || *status == 401
            }
            _ => false,
        }
    }
}

/// Account session returned by `createSession` / `refreshSession`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    /// Short-lived bearer token for ordinary calls.
    pub access_jwt: String,
    /// Longer-lived token accepted only by refresh/delete.
    pub refresh_jwt: String,
    /// Account handle, e.g. `alice.bsky.social`.
    pub handle: String,
    /// Stable account identifier, e.g. `did:plc:...`.
    pub did: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_jwt", &"<redacted>")
            .field("refresh_jwt", &"<redacted>")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Which token, if any, to attach to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    None,
    Access,
    Refresh,
}

/// HTTP settings shared by every client a process creates.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("bsky-mcp/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Build the shared `reqwest` client from [`HttpSettings`].
///
/// # Errors
///
/// Returns [`XrpcError::Transport`] if the TLS backend cannot be initialised.
pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client, XrpcError> {
    Ok(reqwest::Client::builder()
        .timeout(settings.timeout)
        .user_agent(settings.user_agent.clone())
        .build()?)
}

/// XRPC client bound to one service endpoint and at most one account session.
pub struct XrpcClient {
    http: reqwest::Client,
    endpoint: String,
    session: RwLock<Option<SessionTokens>>,
}

impl fmt::Debug for XrpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrpcClient")
            .field("endpoint", &self.endpoint)
            .field("session", &"<RwLock<Option<SessionTokens>>>")
            .finish()
    }
}

impl XrpcClient {
    /// Create a client for `endpoint` sharing the given HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`XrpcError::InvalidEndpoint`] unless `endpoint` is an absolute
    /// `http`/`https` URL.
    pub fn new(http: reqwest::Client, endpoint: &str) -> Result<Self, XrpcError> {
        let endpoint = normalize_endpoint(endpoint)?;
        Ok(Self {
            http,
            endpoint,
            session: RwLock::new(None),
        })
    }

    /// The normalized service endpoint (no trailing slash).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Snapshot of the current session, if any.
    pub async fn session(&self) -> Option<SessionTokens> {
        self.session.read().await.clone()
    }

    /// Log in with `identifier` and `password`, storing the resulting session.
    ///
    /// This performs exactly one request and never retries.
    ///
    /// # Errors
    ///
    /// Returns the remote rejection or transport failure unchanged.
    pub async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionTokens, XrpcError> {
        let body = json!({ "identifier": identifier, "password": password });
        let value = self
            .call_once(Method::POST, CREATE_SESSION, &[], Some(&body), Auth::None)
            .await?;
        let tokens: SessionTokens = decode(CREATE_SESSION, value)?;
        tracing::info!(handle = %tokens.handle, did = %tokens.did, endpoint = %self.endpoint, "xrpc session created");
        *self.session.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    /// Exchange the refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`XrpcError::NoSession`] without a session, or the remote failure.
    pub async fn refresh_session(&self) -> Result<SessionTokens, XrpcError> {
        let value = self
            .call_once(Method::POST, REFRESH_SESSION, &[], None, Auth::Refresh)
            .await?;
        let tokens: SessionTokens = decode(REFRESH_SESSION, value)?;
        tracing::debug!(handle = %tokens.handle, "xrpc session refreshed");
        *self.session.write().await = Some(tokens.clone());
        Ok(tokens)
    }

    /// Revoke the session on the service and forget it locally.
    ///
    /// The local session is cleared even when the remote call fails.
    ///
    /// # Errors
    ///
    /// Returns the remote failure, if any.
    pub async fn delete_session(&self) -> Result<(), XrpcError> {
        let result = self
            .call_once(Method::POST, DELETE_SESSION, &[], None, Auth::Refresh)
            .await;
        *self.session.write().await = None;
        result.map(|_| ())
    }

    /// Resolve a handle to a DID.
    ///
    /// # Errors
    ///
    /// Returns the remote failure, or [`XrpcError::Decode`] if the response
    /// carries no `did`.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String, XrpcError> {
        let handle = handle.trim().trim_start_matches('@');
        let value = self
            .query(RESOLVE_HANDLE, &[("handle".to_string(), handle.to_string())])
            .await?;
        value
            .get("did")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| XrpcError::Decode {
                nsid: RESOLVE_HANDLE.to_string(),
                detail: "missing 'did'".to_string(),
            })
    }

    /// Run an XRPC query (HTTP GET).
    ///
    /// # Errors
    ///
    /// Returns the remote failure or transport error.
    pub async fn query(&self, nsid: &str, params: &[(String, String)]) -> Result<Value, XrpcError> {
        self.call(Method::GET, nsid, params, None).await
    }

    /// Run an XRPC procedure (HTTP POST). `body` is sent as JSON when present.
    ///
    /// # Errors
    ///
    /// Returns the remote failure or transport error.
    pub async fn procedure(&self, nsid: &str, body: Option<&Value>) -> Result<Value, XrpcError> {
        self.call(Method::POST, nsid, &[], body).await
    }

    async fn call(
        &self,
        method: Method,
        nsid: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, XrpcError> {
        let auth = if self.session.read().await.is_some() {
            Auth::Access
        } else {
            Auth::None
        };
        match self.call_once(method.clone(), nsid, params, body, auth).await {
            Err(e) if auth == Auth::Access && e.is_expired_token() => {
                tracing::debug!(nsid, "access token expired; refreshing once");
                self.refresh_session().await?;
                self.call_once(method, nsid, params, body, auth).await
            }
            other => other,
        }
    }

    async fn call_once(
        &self,
        method: Method,
        nsid: &str,
        params: &[(String, String)],
        body: Option<&Value>,
        auth: Auth,
    ) -> Result<Value, XrpcError> {
        let url = xrpc_url(&self.endpoint, nsid);
        let mut request = self.http.request(method, &url);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        match auth {
            Auth::None => {}
            Auth::Access | Auth::Refresh => {
                let token = {
                    let guard = self.session.read().await;
                    let tokens = guard.as_ref().ok_or(XrpcError::NoSession)?;
                    if auth == Auth::Access {
                        tokens.access_jwt.clone()
                    } else {
                        tokens.refresh_jwt.clone()
                    }
                };
                request = request.bearer_auth(token);
            }
        }

        tracing::debug!(nsid, "xrpc request");
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(|e| XrpcError::Decode {
                nsid: nsid.to_string(),
                detail: e.to_string(),
            });
        }
        Err(remote_error(status.as_u16(), status.canonical_reason(), &bytes))
    }
}

/// Validate `endpoint` and strip any trailing slash.
fn normalize_endpoint(endpoint: &str) -> Result<String, XrpcError> {
    let trimmed = endpoint.trim();
    let parsed = url::Url::parse(trimmed).map_err(|e| XrpcError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(XrpcError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn xrpc_url(endpoint: &str, nsid: &str) -> String {
    format!("{endpoint}/xrpc/{nsid}")
}

/// Build an [`XrpcError::Remote`] from a failed response body.
fn remote_error(status: u16, reason: Option<&str>, body: &[u8]) -> XrpcError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let fallback = reason.unwrap_or("UnknownError").replace(' ', "");
    XrpcError::Remote {
        status,
        error: parsed.error.unwrap_or(fallback),
        message: parsed
            .message
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string()),
    }
}

fn decode<T: serde::de::DeserializeOwned>(nsid: &str, value: Value) -> Result<T, XrpcError> {
    serde_json::from_value(value).map_err(|e| XrpcError::Decode {
        nsid: nsid.to_string(),
        detail: e.to_string(),
    })
}
