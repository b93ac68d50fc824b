//! Error taxonomy for tool execution.
//!
//! Every variant maps to an `error_kind` string so clients can branch on the
//! failure class without parsing messages. None of these ever escape as a
//! JSON-RPC protocol error; [`crate::envelope::Envelope`] carries them.

use bsky_mcp_core::XrpcError;
use thiserror::Error;

/// Why a session could not be established.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Identifier or secret is absent (or blank).
    #[error("credentials not configured: {field} is not set")]
    MissingCredentials {
        /// Name of the missing field or environment variable.
        field: String,
    },

    /// The remote login call failed.
    #[error("remote rejected credentials: {message}")]
    AuthenticationFailure {
        /// Upstream message, verbatim.
        message: String,
        /// Underlying XRPC error, when there was one.
        #[source]
        source: Option<XrpcError>,
    },

    /// No session and the configured policy forbids lazy login.
    #[error("not authenticated and no fallback available; call the login tool first")]
    NotAuthenticated,
}

impl AuthError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredentials { .. } => "missing_credentials",
            Self::AuthenticationFailure { .. } => "authentication_failed",
            Self::NotAuthenticated => "not_authenticated",
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingCredentials {
            field: field.into(),
        }
    }
}

impl From<XrpcError> for AuthError {
    fn from(e: XrpcError) -> Self {
        let message = match &e {
            XrpcError::Remote { message, error, .. } if !message.is_empty() => {
                format!("{error}: {message}")
            }
            other => other.to_string(),
        };
        Self::AuthenticationFailure {
            message,
            source: Some(e),
        }
    }
}

/// Failure of one tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No usable session.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A proxied remote call failed.
    #[error("{context}: {source}")]
    Upstream {
        /// What the tool was doing, e.g. `Failed to get profile`.
        context: String,
        /// The XRPC failure.
        #[source]
        source: XrpcError,
    },

    /// A required argument is missing or malformed.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The request was well-formed but cannot be honoured.
    #[error("{0}")]
    Rejected(String),

    /// The tool did not finish within the configured request timeout.
    #[error("tool call timed out after {0}s")]
    Timeout(u64),
}

impl ToolError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.kind(),
            Self::Upstream { .. } => "upstream",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::Rejected(_) => "rejected",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Build an [`ToolError::Upstream`] with a short context prefix.
    pub fn upstream(context: impl Into<String>, source: XrpcError) -> Self {
        Self::Upstream {
            context: context.into(),
            source,
        }
    }

    /// `true` when the session that issued the call should be discarded.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::Upstream { source, .. } if source.is_session_invalid())
    }
}

/// Attach upstream context to XRPC results, as in `.context(...)`.
pub trait UpstreamContext<T> {
    /// Wrap an [`XrpcError`] into [`ToolError::Upstream`].
    fn upstream(self, context: &str) -> Result<T, ToolError>;
}

impl<T> UpstreamContext<T> for Result<T, XrpcError> {
    fn upstream(self, context: &str) -> Result<T, ToolError> {
        self.map_err(|e| ToolError::upstream(context, e))
    }
}
