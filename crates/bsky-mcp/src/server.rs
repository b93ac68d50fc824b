//! Minimal MCP JSON-RPC server.
//!
//! [`McpServer`] answers the MCP lifecycle and discovery methods itself and
//! routes `tools/call` through the [`ToolSet`]. Each connection is one
//! session: it gets a fresh [`SessionKey`], its requests are handled in
//! order, and its session handle is released when the peer disconnects.
//!
//! Tool failures are reported inside a successful JSON-RPC result with
//! `isError: true`; JSON-RPC errors are reserved for protocol faults
//! (unparseable input, unknown method, unknown tool or resource).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::timeout;

use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::framing::{Framing, MessageReader, write_message};
use crate::gate::AuthGate;
use crate::params::Args;
use crate::session::SessionKey;
use crate::tools::{CATALOGUE_URI, ToolSet};

/// MCP protocol revision offered when the client does not name one.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error code: parse error.
pub const ERR_PARSE: i64 = -32700;

/// JSON-RPC error code: invalid request.
pub const ERR_INVALID_REQUEST: i64 = -32600;

/// JSON-RPC error code: method not found.
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code: invalid params.
pub const ERR_INVALID_PARAMS: i64 = -32602;

const SERVER_NAME: &str = "bsky-mcp";

const INSTRUCTIONS: &str = "Bluesky tools. Most tools need a session: call `login`, or set \
IDENTITY_HANDLE and IDENTITY_SECRET to log in automatically on first use. Read the \
info://bluesky-tools resource for the full catalogue.";

/// Serves MCP over any number of connections sharing one [`AuthGate`].
#[derive(Debug)]
pub struct McpServer {
    gate: Arc<AuthGate>,
    tools: ToolSet,
    request_timeout: Duration,
}

impl McpServer {
    /// Server over `gate`, bounding each tool call by `request_timeout`.
    pub fn new(gate: Arc<AuthGate>, request_timeout: Duration) -> Self {
        Self {
            gate,
            tools: ToolSet::new(),
            request_timeout,
        }
    }

    /// The shared gate.
    pub fn gate(&self) -> &Arc<AuthGate> {
        &self.gate
    }

    /// Tool catalogue.
    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Handle one raw message. Returns the response, or `None` for
    /// notifications and stray responses.
    pub async fn handle_raw(&self, key: &SessionKey, raw: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(raw) {
            Ok(msg) => self.handle(key, msg).await,
            Err(e) => {
                tracing::warn!(session = %key, "failed to parse JSON-RPC message: {e}");
                Some(make_error_response(Value::Null, ERR_PARSE, "Parse error", json!({ "detail": e.to_string() })))
            }
        }
    }

    /// Handle one decoded message.
    pub async fn handle(&self, key: &SessionKey, msg: Value) -> Option<Value> {
        let id = msg.get("id").cloned();
        let Some(method) = msg.get("method").and_then(Value::as_str) else {
            if id.is_some() && (msg.get("result").is_some() || msg.get("error").is_some()) {
                tracing::debug!(session = %key, "ignoring client response");
                return None;
            }
            return Some(make_error_response(
                id.unwrap_or(Value::Null),
                ERR_INVALID_REQUEST,
                "Invalid Request",
                Value::Null,
            ));
        };
        let params = msg.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = id else {
            tracing::debug!(session = %key, method, "notification");
            return None;
        };
        tracing::debug!(session = %key, method, %id, "request");

        let result = match method {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools.list() })),
            "tools/call" => self.tools_call(key, &params).await,
            "resources/list" => Ok(self.resources_list()),
            "resources/read" => self.resources_read(&params),
            other => Err((ERR_METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };
        Some(match result {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => make_error_response(id, code, &message, Value::Null),
        })
    }

    fn initialize(&self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": INSTRUCTIONS,
        })
    }

    async fn tools_call(&self, key: &SessionKey, params: &Value) -> Result<Value, (i64, String)> {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err((ERR_INVALID_PARAMS, "tools/call requires a tool name".to_string()));
        };
        if self.tools.get(name).is_none() {
            return Err((ERR_INVALID_PARAMS, format!("Unknown tool: {name}")));
        }
        let args = Args::new(params.get("arguments").cloned());

        let call = self.tools.call(&self.gate, key, name, args);
        let envelope = match timeout(self.request_timeout, call).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Err((ERR_INVALID_PARAMS, format!("Unknown tool: {name}"))),
            Err(_) => {
                tracing::warn!(session = %key, tool = name, "tool call timed out");
                Envelope::from(ToolError::Timeout(self.request_timeout.as_secs()))
            }
        };
        Ok(tool_result(&envelope))
    }

    fn resources_list(&self) -> Value {
        json!({
            "resources": [{
                "uri": CATALOGUE_URI,
                "name": "bluesky-tools",
                "description": "Catalogue of the available Bluesky tools",
                "mimeType": "text/markdown",
            }],
        })
    }

    fn resources_read(&self, params: &Value) -> Result<Value, (i64, String)> {
        let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
        if uri != CATALOGUE_URI {
            return Err((ERR_INVALID_PARAMS, format!("Unknown resource: {uri}")));
        }
        Ok(json!({
            "contents": [{
                "uri": CATALOGUE_URI,
                "mimeType": "text/markdown",
                "text": self.tools.catalogue(),
            }],
        }))
    }

    /// Serve one connection as session `key` until EOF, then release its handle.
    ///
    /// # Errors
    ///
    /// Returns an error on unrecoverable I/O failures. The session is
    /// released either way.
    pub async fn serve_connection<R, W>(&self, key: SessionKey, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(session = %key, "session opened");
        let outcome = self.connection_loop(&key, input, &mut output).await;
        self.gate.end_session(&key).await;
        tracing::info!(session = %key, "session closed");
        outcome
    }

    async fn connection_loop<R, W>(&self, key: &SessionKey, input: R, output: &mut W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = MessageReader::new(input);
        let mut framing = Framing::default();
        loop {
            let frame = match reader.next_message().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!(session = %key, "dropping malformed frame: {e}");
                    write_message(output, framing, &parse_error(&e).to_string()).await?;
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                    tracing::warn!(session = %key, "unrecoverable framing error, closing: {e}");
                    write_message(output, framing, &parse_error(&e).to_string()).await?;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };
            framing = frame.framing;
            if let Some(response) = self.handle_raw(key, &frame.body).await {
                write_message(output, framing, &response.to_string()).await?;
            }
        }
    }

    /// Serve a single session on stdin/stdout.
    ///
    /// # Errors
    ///
    /// Returns an error on unrecoverable I/O failures.
    pub async fn serve_stdio(&self) -> anyhow::Result<()> {
        self.serve_connection(SessionKey::generate(), tokio::io::stdin(), tokio::io::stdout())
            .await
    }

    /// Accept connections on `listener`, one session each, until the task is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting fails.
    pub async fn serve_tcp(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let key = SessionKey::generate();
                tracing::info!(session = %key, %peer, "connection accepted");
                let (read, write) = stream.into_split();
                if let Err(e) = server.serve_connection(key, read, write).await {
                    tracing::warn!(%peer, "connection ended with error: {e}");
                }
            });
        }
    }
}

/// `tools/call` result for `envelope`.
pub fn tool_result(envelope: &Envelope) -> Value {
    let structured = envelope.to_value();
    let text = serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": envelope.is_error(),
        "structuredContent": structured,
    })
}

fn parse_error(e: &std::io::Error) -> Value {
    make_error_response(Value::Null, ERR_PARSE, "Parse error", json!({ "detail": e.to_string() }))
}

/// Construct a JSON-RPC error response.
pub fn make_error_response(id: Value, code: i64, message: &str, data: Value) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if !data.is_null() {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}
