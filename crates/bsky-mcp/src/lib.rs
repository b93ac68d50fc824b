//! bsky-mcp library crate.
//!
//! Provides the credential resolver, session registry, authentication gate,
//! Bluesky tools, MCP server, framing, configuration, and CLI types for the
//! `bsky-mcp` binary. Exposed as a library for integration testing and
//! embedding.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod gate;
pub mod params;
pub mod server;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tools;

#[doc(inline)]
pub use gate::{AuthGate, ProtectedOperation};
#[doc(inline)]
pub use server::McpServer;
#[doc(inline)]
pub use session::{SessionKey, SessionRegistry};
