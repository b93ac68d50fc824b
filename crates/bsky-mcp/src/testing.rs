//! Scripted [`ClientFactory`] and [`SocialGraphClient`] for tests.
//!
//! Both record every call for later assertions and return canned replies,
//! so the gate and the tools can be driven without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bsky_mcp_core::XrpcError;
use chrono::Utc;
use serde_json::{Value, json};

use crate::client::{ClientFactory, ClientHandle, Identity, SocialGraphClient};
use crate::credentials::Credential;
use crate::error::AuthError;

/// Canned reply for one NSID.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Successful response body.
    Ok(Value),
    /// XRPC error response.
    Err {
        /// HTTP status.
        status: u16,
        /// XRPC error name.
        error: String,
        /// Error message.
        message: String,
    },
}

impl MockReply {
    fn to_result(&self) -> Result<Value, XrpcError> {
        match self {
            Self::Ok(v) => Ok(v.clone()),
            Self::Err {
                status,
                error,
                message,
            } => Err(XrpcError::Remote {
                status: *status,
                error: error.clone(),
                message: message.clone(),
            }),
        }
    }
}

/// Record of one remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Endpoint called.
    pub nsid: String,
    /// Query parameters (queries only).
    pub params: Vec<(String, String)>,
    /// JSON body (procedures only).
    pub body: Option<Value>,
}

impl MockCall {
    /// First value of query parameter `key`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted stand-in for an authenticated session.
#[derive(Debug)]
pub struct MockClient {
    identity: Identity,
    replies: Mutex<HashMap<String, MockReply>>,
    call_log: Mutex<Vec<MockCall>>,
    closed: AtomicBool,
}

impl MockClient {
    /// Client logged in as `handle`, with DID `did:plc:<handle>`.
    pub fn new(handle: &str) -> Self {
        Self::with_replies(handle, HashMap::new())
    }

    fn with_replies(handle: &str, replies: HashMap<String, MockReply>) -> Self {
        let handle = handle.trim_start_matches('@');
        Self {
            identity: Identity {
                handle: handle.to_string(),
                did: format!("did:plc:{handle}"),
                service_endpoint: "https://pds.invalid".to_string(),
                authenticated_at: Utc::now(),
            },
            replies: Mutex::new(replies),
            call_log: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Answer `nsid` with `value`.
    pub fn respond(&self, nsid: &str, value: Value) {
        self.replies
            .lock()
            .unwrap()
            .insert(nsid.to_string(), MockReply::Ok(value));
    }

    /// Answer `nsid` with an XRPC error.
    pub fn fail(&self, nsid: &str, status: u16, error: &str, message: &str) {
        self.replies.lock().unwrap().insert(
            nsid.to_string(),
            MockReply::Err {
                status,
                error: error.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Copy of the call log.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Calls made to `nsid`.
    pub fn calls_to(&self, nsid: &str) -> Vec<MockCall> {
        self.get_calls()
            .into_iter()
            .filter(|c| c.nsid == nsid)
            .collect()
    }

    /// `true` once [`SocialGraphClient::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn reply(&self, call: MockCall) -> Result<Value, XrpcError> {
        let reply = self.replies.lock().unwrap().get(&call.nsid).cloned();
        self.call_log.lock().unwrap().push(call);
        match reply {
            Some(r) => r.to_result(),
            None => Ok(json!({})),
        }
    }
}

#[async_trait]
impl SocialGraphClient for MockClient {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn query(&self, nsid: &str, params: &[(String, String)]) -> Result<Value, XrpcError> {
        self.reply(MockCall {
            nsid: nsid.to_string(),
            params: params.to_vec(),
            body: None,
        })
    }

    async fn procedure(&self, nsid: &str, body: Option<Value>) -> Result<Value, XrpcError> {
        self.reply(MockCall {
            nsid: nsid.to_string(),
            params: Vec::new(),
            body,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Scripted [`ClientFactory`].
///
/// Logins succeed as the requested identifier unless [`Self::with_rejection`]
/// is set. Every created client shares the factory's scripted replies.
#[derive(Debug, Default)]
pub struct MockClientFactory {
    rejection: Option<String>,
    login_delay: Option<Duration>,
    replies: Mutex<HashMap<String, MockReply>>,
    logins: Mutex<Vec<String>>,
    clients: Mutex<Vec<Arc<MockClient>>>,
    dids: Mutex<HashMap<String, String>>,
    resolutions: Mutex<Vec<String>>,
}

impl MockClientFactory {
    /// Factory whose logins always succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every login with `message`.
    pub fn with_rejection(mut self, message: &str) -> Self {
        self.rejection = Some(message.to_string());
        self
    }

    /// Sleep before completing each login.
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = Some(delay);
        self
    }

    /// Answer `nsid` with `value` on every client this factory creates.
    pub fn respond(&self, nsid: &str, value: Value) {
        self.replies
            .lock()
            .unwrap()
            .insert(nsid.to_string(), MockReply::Ok(value));
    }

    /// Answer `nsid` with an XRPC error on every client this factory creates.
    pub fn fail(&self, nsid: &str, status: u16, error: &str, message: &str) {
        self.replies.lock().unwrap().insert(
            nsid.to_string(),
            MockReply::Err {
                status,
                error: error.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Map `handle` to `did` for public resolution.
    pub fn with_did(self, handle: &str, did: &str) -> Self {
        self.dids
            .lock()
            .unwrap()
            .insert(handle.to_string(), did.to_string());
        self
    }

    /// Identifiers passed to `authenticate`, in order.
    pub fn logins(&self) -> Vec<String> {
        self.logins.lock().unwrap().clone()
    }

    /// Number of `authenticate` calls.
    pub fn login_count(&self) -> usize {
        self.logins.lock().unwrap().len()
    }

    /// Clients created by successful logins, in order.
    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().unwrap().clone()
    }

    /// Most recently created client.
    pub fn last_client(&self) -> Option<Arc<MockClient>> {
        self.clients.lock().unwrap().last().cloned()
    }

    /// Handles passed to `resolve_handle_public`.
    pub fn public_resolutions(&self) -> Vec<String> {
        self.resolutions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn authenticate(&self, credential: &Credential) -> Result<ClientHandle, AuthError> {
        self.logins
            .lock()
            .unwrap()
            .push(credential.identifier().to_string());
        if let Some(delay) = self.login_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.rejection {
            return Err(AuthError::AuthenticationFailure {
                message: message.clone(),
                source: None,
            });
        }
        let replies = self.replies.lock().unwrap().clone();
        let client = Arc::new(MockClient::with_replies(credential.identifier(), replies));
        self.clients.lock().unwrap().push(client.clone());
        Ok(client)
    }

    async fn resolve_handle_public(&self, handle: &str) -> Result<String, XrpcError> {
        let handle = handle.trim().trim_start_matches('@').to_string();
        self.resolutions.lock().unwrap().push(handle.clone());
        match self.dids.lock().unwrap().get(&handle) {
            Some(did) => Ok(did.clone()),
            None => Err(XrpcError::Remote {
                status: 400,
                error: "InvalidRequest".to_string(),
                message: "Unable to resolve handle".to_string(),
            }),
        }
    }
}
