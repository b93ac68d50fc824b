//! Uniform result shape returned by every tool.
//!
//! ```json
//! {"status": "success", "profile": {...}}
//! {"status": "error", "message": "...", "error_kind": "missing_credentials"}
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Payload fields, flattened next to `"status": "success"`.
    Success(Map<String, Value>),
    /// Human-readable failure.
    Error {
        /// Message shown to the caller.
        message: String,
        /// Failure class, when known.
        kind: Option<&'static str>,
    },
}

impl Envelope {
    /// Success with no payload.
    pub fn success() -> Self {
        Self::Success(Map::new())
    }

    /// Success carrying the fields of `payload`.
    ///
    /// A non-object payload is stored under `"data"`.
    pub fn ok(payload: Value) -> Self {
        match payload {
            Value::Object(map) => Self::Success(map),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                Self::Success(map)
            }
        }
    }

    /// Add one payload field. No-op on error envelopes.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Self::Success(map) = &mut self {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Error with a message and no kind.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            kind: None,
        }
    }

    /// `true` for error envelopes.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Payload field of a success envelope.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Success(map) => map.get(key),
            Self::Error { .. } => None,
        }
    }

    /// Error message, if this is an error envelope.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            Self::Success(map) => map.get("message").and_then(Value::as_str),
        }
    }

    /// Error kind, if this is an error envelope with one.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::Error { kind, .. } => *kind,
            Self::Success(_) => None,
        }
    }

    /// JSON form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

impl From<ToolError> for Envelope {
    fn from(e: ToolError) -> Self {
        Self::Error {
            message: e.to_string(),
            kind: Some(e.kind()),
        }
    }
}

impl From<Result<Envelope, ToolError>> for Envelope {
    fn from(r: Result<Envelope, ToolError>) -> Self {
        r.unwrap_or_else(Envelope::from)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success(payload) => {
                let fields = payload.iter().filter(|(k, _)| k.as_str() != "status");
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("status", "success")?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Error { message, kind } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("message", message)?;
                if let Some(kind) = kind {
                    map.serialize_entry("error_kind", kind)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use serde_json::json;

    #[test]
    fn success_flattens_payload_after_status() {
        let env = Envelope::ok(json!({"profile": {"handle": "alice.test"}})).with("extra", 1);
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.starts_with(r#"{"status":"success""#));
        let v = env.to_value();
        assert_eq!(v["profile"]["handle"], "alice.test");
        assert_eq!(v["extra"], 1);
    }

    #[test]
    fn payload_cannot_override_status() {
        let env = Envelope::ok(json!({"status": "error", "x": 1}));
        let v = env.to_value();
        assert_eq!(v["status"], "success");
        assert_eq!(v["x"], 1);
    }

    #[test]
    fn non_object_payload_goes_under_data() {
        let v = Envelope::ok(json!([1, 2])).to_value();
        assert_eq!(v["data"], json!([1, 2]));
    }

    #[test]
    fn error_carries_message_and_kind() {
        let env: Envelope = ToolError::from(AuthError::NotAuthenticated).into();
        assert!(env.is_error());
        let v = env.to_value();
        assert_eq!(v["status"], "error");
        assert_eq!(v["error_kind"], "not_authenticated");
        assert!(v["message"].as_str().unwrap().contains("not authenticated"));
    }

    #[test]
    fn plain_error_has_no_kind() {
        let v = Envelope::error("You can only delete your own posts").to_value();
        assert_eq!(v, json!({"status": "error", "message": "You can only delete your own posts"}));
    }

    #[test]
    fn with_is_noop_on_error() {
        let env = Envelope::error("boom").with("x", 1);
        assert_eq!(env.field("x"), None);
        assert_eq!(env.message(), Some("boom"));
    }
}
