//! Argument extraction and pagination normalization shared by all tools.
//!
//! Pagination knobs are clamped, never rejected: a caller asking for
//! `limit = 500` gets 100 results, and `limit = "abc"` gets the default.

use serde_json::{Map, Value};

use crate::error::ToolError;

/// Smallest page size.
pub const MIN_LIMIT: u32 = 1;
/// Largest page size the service accepts.
pub const MAX_LIMIT: u32 = 100;

/// Interpret `value` as a number; numeric strings are accepted.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n.trunc())
}

/// Clamp a requested page size into `[1, 100]`.
///
/// Non-numeric or absent input yields `default` (itself clamped).
pub fn clamp_limit(requested: Option<&Value>, default: u32) -> u32 {
    let clamped = |n: f64| n.clamp(f64::from(MIN_LIMIT), f64::from(MAX_LIMIT)) as u32;
    match requested.and_then(as_number) {
        Some(n) => clamped(n),
        None => default.clamp(MIN_LIMIT, MAX_LIMIT),
    }
}

/// Clamp an integer knob into `[min, max]`, falling back to `default`.
pub fn clamp_range(requested: Option<&Value>, min: i64, max: i64, default: i64) -> i64 {
    match requested.and_then(as_number) {
        Some(n) => n.clamp(min as f64, max as f64) as i64,
        None => default.clamp(min, max),
    }
}

/// Cursor passthrough: present and non-empty only.
pub fn pass_cursor(cursor: Option<&str>) -> Option<String> {
    cursor.filter(|c| !c.is_empty()).map(str::to_string)
}

/// Named tool arguments.
#[derive(Debug, Clone, Default)]
pub struct Args(Map<String, Value>);

impl Args {
    /// Wrap `tools/call` arguments. Anything but an object is treated as empty.
    pub fn new(value: Option<Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    /// Raw value for `key`; JSON `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// String argument, trimmed; empty counts as absent.
    ///
    /// Numbers and booleans are rendered as strings.
    pub fn opt_str(&self, key: &str) -> Option<String> {
        let s = match self.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!s.is_empty()).then_some(s)
    }

    /// Required string argument.
    pub fn require(&self, key: &str) -> Result<String, ToolError> {
        self.opt_str(key)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing required argument '{key}'")))
    }

    /// Object argument.
    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    /// Array argument; a single non-array value is treated as a one-item list.
    pub fn list(&self, key: &str) -> Vec<Value> {
        match self.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        }
    }

    /// Page size, clamped.
    pub fn limit(&self, default: u32) -> u32 {
        clamp_limit(self.get("limit"), default)
    }

    /// Pagination cursor.
    pub fn cursor(&self) -> Option<String> {
        pass_cursor(self.get("cursor").and_then(Value::as_str))
    }

    /// Boolean flag; accepts `true`/`false` and their string forms.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// XRPC query parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    /// Empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value`.
    pub fn push(mut self, key: &str, value: impl ToString) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    /// Append `key=value` when `value` is present.
    pub fn opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.push(key, v),
            None => self,
        }
    }

    /// Append `limit` and `cursor` from the tool arguments.
    pub fn page(self, args: &Args, default_limit: u32) -> Self {
        self.push("limit", args.limit(default_limit))
            .opt("cursor", args.cursor())
    }

    /// Parameter slice for [`crate::client::SocialGraphClient::query`].
    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}
