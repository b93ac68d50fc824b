//! Core library for bsky-mcp.
//!
//! Provides the pieces of the AT Protocol the MCP tools sit on: an XRPC HTTP
//! client with session handling, AT URI and `bsky.app` link parsing, record
//! builders for repository writes, and shared logging setup.

pub mod aturi;
pub mod logging;
pub mod record;
pub mod xrpc;

pub use aturi::{AtUri, AtUriError, WebLink, parse_web_link};
pub use record::StrongRef;
pub use xrpc::{HttpSettings, SessionTokens, XrpcClient, XrpcError};

// Re-export reqwest so downstream crates share one HTTP client type
pub use reqwest;
