//! AT URI parsing and `bsky.app` web link recognition.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SCHEME: &str = "at://";

/// Errors returned when parsing an AT URI or a web link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtUriError {
    /// The string does not start with `at://`.
    #[error("not an AT URI: {0}")]
    MissingScheme(String),

    /// The authority (DID or handle) segment is empty.
    #[error("AT URI has no authority: {0}")]
    MissingAuthority(String),

    /// The URL is not a recognised `bsky.app` post or profile link.
    #[error("Unsupported URL format")]
    UnsupportedUrl,
}

/// A parsed `at://<authority>[/<collection>[/<rkey>]]` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri {
    /// DID or handle of the repository.
    pub authority: String,
    /// Collection NSID, e.g. `app.bsky.feed.post`.
    pub collection: Option<String>,
    /// Record key within the collection.
    pub rkey: Option<String>,
}

impl AtUri {
    /// Build a record URI.
    pub fn record(authority: impl Into<String>, collection: &str, rkey: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            collection: Some(collection.to_string()),
            rkey: Some(rkey.into()),
        }
    }

    /// `true` when the authority is a DID rather than a handle.
    pub fn has_did_authority(&self) -> bool {
        self.authority.starts_with("did:")
    }
}

impl FromStr for AtUri {
    type Err = AtUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .trim()
            .strip_prefix(SCHEME)
            .ok_or_else(|| AtUriError::MissingScheme(s.to_string()))?;
        // Drop any query or fragment.
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let mut parts = rest.split('/').filter(|p| !p.is_empty());
        let authority = parts
            .next()
            .ok_or_else(|| AtUriError::MissingAuthority(s.to_string()))?;
        Ok(Self {
            authority: authority.to_string(),
            collection: parts.next().map(str::to_string),
            rkey: parts.next().map(str::to_string),
        })
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}", self.authority)?;
        if let Some(collection) = &self.collection {
            write!(f, "/{collection}")?;
            if let Some(rkey) = &self.rkey {
                write!(f, "/{rkey}")?;
            }
        }
        Ok(())
    }
}

/// A `bsky.app` web link reduced to its identifying parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebLink {
    /// `https://bsky.app/profile/<actor>/post/<rkey>`
    Post {
        /// Handle or DID from the URL.
        actor: String,
        /// Post record key.
        rkey: String,
    },
    /// `https://bsky.app/profile/<actor>`
    Profile {
        /// Handle or DID from the URL.
        actor: String,
    },
}

/// Recognise a `bsky.app` post or profile URL.
///
/// Accepts `http` and `https`, with or without `www.`. Anything else yields
/// [`AtUriError::UnsupportedUrl`].
pub fn parse_web_link(raw: &str) -> Result<WebLink, AtUriError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|_| AtUriError::UnsupportedUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AtUriError::UnsupportedUrl);
    }
    match parsed.host_str() {
        Some("bsky.app") | Some("www.bsky.app") => {}
        _ => return Err(AtUriError::UnsupportedUrl),
    }
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        ["profile", actor, "post", rkey, ..] => Ok(WebLink::Post {
            actor: (*actor).to_string(),
            rkey: (*rkey).to_string(),
        }),
        ["profile", actor, ..] => Ok(WebLink::Profile {
            actor: (*actor).to_string(),
        }),
        _ => Err(AtUriError::UnsupportedUrl),
    }
}
