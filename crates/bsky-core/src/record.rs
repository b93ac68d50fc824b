//! Record builders for the repository writes the tools perform.
//!
//! Records are plain `serde_json::Value`s: the lexicon types are open and the
//! service validates them, so only the fields written here are modelled.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// `app.bsky.feed.post`
pub const POST: &str = "app.bsky.feed.post";
/// `app.bsky.feed.like`
pub const LIKE: &str = "app.bsky.feed.like";
/// `app.bsky.feed.repost`
pub const REPOST: &str = "app.bsky.feed.repost";
/// `app.bsky.graph.follow`
pub const FOLLOW: &str = "app.bsky.graph.follow";
/// `app.bsky.graph.block`
pub const BLOCK: &str = "app.bsky.graph.block";

/// Current time as an RFC 3339 timestamp with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// `com.atproto.repo.strongRef`: a record pinned by URI and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    /// AT URI of the record.
    pub uri: String,
    /// CID of the record version.
    pub cid: String,
}

/// Reply target for a new post. `root` falls back to `parent` when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    /// Thread root.
    pub root: Option<StrongRef>,
    /// Post being replied to.
    pub parent: StrongRef,
}

/// A hyperlink to annotate within post text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    /// Target URL.
    pub url: String,
    /// Text span to annotate; the URL itself when `None`.
    pub text: Option<String>,
}

/// Everything `create_post` can put in a post record.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    /// Post body.
    pub text: String,
    /// Reply target.
    pub reply: Option<ReplyRef>,
    /// Quoted post.
    pub quote: Option<StrongRef>,
    /// Links to annotate with facets.
    pub links: Vec<LinkSpec>,
}

/// Build an `app.bsky.feed.post` record.
///
/// Links whose span does not occur in `text` are skipped.
pub fn post_record(draft: &PostDraft, created_at: &str) -> Value {
    let mut record = json!({
        "$type": POST,
        "text": draft.text,
        "createdAt": created_at,
    });
    if let Some(reply) = &draft.reply {
        let root = reply.root.as_ref().unwrap_or(&reply.parent);
        record["reply"] = json!({ "root": root, "parent": reply.parent });
    }
    if let Some(quote) = &draft.quote {
        record["embed"] = json!({ "$type": "app.bsky.embed.record", "record": quote });
    }
    let facets = link_facets(&draft.text, &draft.links);
    if !facets.is_empty() {
        record["facets"] = Value::Array(facets);
    }
    record
}

/// Link facets for `links`, with UTF-8 byte offsets into `text`.
///
/// Each span is matched at its first occurrence after the previous match so
/// repeated spans annotate successive occurrences.
pub fn link_facets(text: &str, links: &[LinkSpec]) -> Vec<Value> {
    let mut facets = Vec::new();
    let mut search_from = 0usize;
    for link in links {
        let span = link.text.as_deref().unwrap_or(&link.url);
        if span.is_empty() {
            continue;
        }
        let found = text[search_from..]
            .find(span)
            .map(|i| i + search_from)
            .or_else(|| text.find(span));
        let Some(start) = found else {
            tracing::debug!(url = %link.url, "link span not found in post text");
            continue;
        };
        let end = start + span.len();
        search_from = end;
        facets.push(json!({
            "index": { "byteStart": start, "byteEnd": end },
            "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": link.url }],
        }));
    }
    facets
}

/// Record whose only payload is a `subject` strong ref (likes, reposts).
pub fn subject_ref_record(collection: &str, subject: &StrongRef, created_at: &str) -> Value {
    json!({ "$type": collection, "subject": subject, "createdAt": created_at })
}

/// Record whose only payload is a `subject` DID (follows, blocks).
pub fn subject_did_record(collection: &str, did: &str, created_at: &str) -> Value {
    json!({ "$type": collection, "subject": did, "createdAt": created_at })
}

/// Body for `com.atproto.repo.createRecord`.
pub fn create_record_body(repo: &str, collection: &str, record: Value) -> Value {
    json!({ "repo": repo, "collection": collection, "record": record })
}

/// Body for `com.atproto.repo.deleteRecord`.
pub fn delete_record_body(repo: &str, collection: &str, rkey: &str) -> Value {
    json!({ "repo": repo, "collection": collection, "rkey": rkey })
}
