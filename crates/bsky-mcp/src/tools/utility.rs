//! Session-optional lookups and preference helpers.
//!
//! `resolve_handle` and `convert_url_to_uri` work without logging in: they
//! reuse the caller's session when one exists and otherwise fall back to the
//! public AppView. They never trigger a lazy login.

use bsky_mcp_core::{WebLink, XrpcError, parse_web_link, record};
use serde_json::{Value, json};

use super::{Access, Group, ToolDef, ToolId, bare_handle, query, resolve_actor, schema, string_prop};
use crate::client::ClientHandle;
use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::gate::AuthGate;
use crate::params::{Args, Query};
use crate::session::SessionKey;

const SAVED_FEEDS_V2: &str = "app.bsky.actor.defs#savedFeedsPrefV2";
const SAVED_FEEDS_V1: &str = "app.bsky.actor.defs#savedFeedsPref";

pub(crate) fn definitions() -> Vec<ToolDef> {
    let g = Group::Utilities;
    vec![
        ToolDef::new(
            ToolId::ConvertUrlToUri,
            "convert_url_to_uri",
            g,
            Access::Public,
            "Convert a bsky.app post or profile URL to an AT URI",
            schema(
                json!({ "url": string_prop("e.g. https://bsky.app/profile/alice.bsky.social/post/3k...") }),
                &["url"],
            ),
        ),
        ToolDef::new(
            ToolId::GetPinnedFeeds,
            "get_pinned_feeds",
            g,
            Access::Protected,
            "List the feeds pinned in your preferences",
            schema(json!({}), &[]),
        ),
    ]
}

/// Run a session-optional tool.
pub(crate) async fn call_public(
    id: ToolId,
    gate: &AuthGate,
    key: &SessionKey,
    args: &Args,
) -> Result<Envelope, ToolError> {
    match id {
        ToolId::ResolveHandle => {
            let handle = args.require("handle")?;
            let did = resolve_optional(gate, key, &handle).await?;
            Ok(Envelope::ok(json!({
                "handle": bare_handle(&handle),
                "did": did,
            })))
        }
        ToolId::ConvertUrlToUri => convert_url_to_uri(gate, key, args).await,
        other => Err(ToolError::Rejected(format!("{other:?} is not a public tool"))),
    }
}

/// DID for `actor`, through the caller's session if there is one.
async fn resolve_optional(gate: &AuthGate, key: &SessionKey, actor: &str) -> Result<String, ToolError> {
    let actor = bare_handle(actor);
    if actor.starts_with("did:") {
        return Ok(actor.to_string());
    }
    match gate.registry().get(key) {
        Some(client) => resolve_actor(&client, actor).await,
        None => gate
            .factory()
            .resolve_handle_public(actor)
            .await
            .map_err(|e: XrpcError| ToolError::upstream(format!("Failed to resolve handle @{actor}"), e)),
    }
}

async fn convert_url_to_uri(gate: &AuthGate, key: &SessionKey, args: &Args) -> Result<Envelope, ToolError> {
    let url = args.require("url")?;
    let link = parse_web_link(&url).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    match link {
        WebLink::Post { actor, rkey } => {
            let did = resolve_optional(gate, key, &actor).await?;
            Ok(Envelope::ok(json!({
                "uri": format!("at://{did}/{}/{rkey}", record::POST),
            })))
        }
        WebLink::Profile { actor } => {
            let did = resolve_optional(gate, key, &actor).await?;
            Ok(Envelope::ok(json!({
                "uri": format!("at://{did}"),
                "did": did,
            })))
        }
    }
}

/// Pinned feed generator URIs from a `getPreferences` response.
fn pinned_feed_uris(preferences: &Value) -> Vec<String> {
    let prefs = preferences
        .get("preferences")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let of_type = |ty: &str| prefs.iter().find(|p| p.get("$type").and_then(Value::as_str) == Some(ty));

    if let Some(v2) = of_type(SAVED_FEEDS_V2) {
        return v2
            .get("items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|item| item.get("pinned").and_then(Value::as_bool) == Some(true))
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("feed"))
            .filter_map(|item| item.get("value").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
    }
    of_type(SAVED_FEEDS_V1)
        .and_then(|v1| v1.get("pinned"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

pub(crate) async fn get_pinned_feeds(client: &ClientHandle, _args: &Args) -> Result<Envelope, ToolError> {
    let preferences = query(
        client,
        "app.bsky.actor.getPreferences",
        Query::new(),
        "Failed to get pinned feeds",
    )
    .await?;

    let mut feeds = Vec::new();
    for uri in pinned_feed_uris(&preferences) {
        let params = Query::new().push("feed", &uri);
        match client.query("app.bsky.feed.getFeedGenerator", params.as_slice()).await {
            Ok(info) => feeds.push(json!({ "uri": uri, "info": info })),
            Err(e) => tracing::warn!(feed = %uri, error = %e, "skipping pinned feed"),
        }
    }
    Ok(Envelope::ok(json!({ "pinned_feeds": feeds })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthPolicy;
    use crate::credentials::MapEnv;
    use crate::testing::{MockClient, MockClientFactory};
    use std::sync::Arc;

    fn gate(factory: Arc<MockClientFactory>) -> AuthGate {
        AuthGate::new(factory, Arc::new(MapEnv::new()), AuthPolicy::Lazy)
    }

    fn args(v: Value) -> Args {
        Args::new(Some(v))
    }

    #[tokio::test]
    async fn resolve_handle_without_session_uses_public_lookup() {
        let factory = Arc::new(MockClientFactory::new().with_did("bob.test", "did:plc:bob"));
        let gate = gate(factory.clone());
        let key = SessionKey::from("s1");
        let env = call_public(ToolId::ResolveHandle, &gate, &key, &args(json!({"handle": "@bob.test"})))
            .await
            .unwrap();
        assert_eq!(env.field("did").unwrap(), "did:plc:bob");
        assert_eq!(env.field("handle").unwrap(), "bob.test");
        assert_eq!(factory.public_resolutions(), vec!["bob.test".to_string()]);
        assert_eq!(factory.login_count(), 0);
        assert!(!gate.registry().is_authenticated(&key));
    }

    #[tokio::test]
    async fn resolve_handle_prefers_session() {
        let factory = Arc::new(MockClientFactory::new());
        let gate = gate(factory.clone());
        let key = SessionKey::from("s1");
        let mock = Arc::new(MockClient::new("alice.test"));
        mock.respond("com.atproto.identity.resolveHandle", json!({"did": "did:plc:bob"}));
        gate.registry().put(&key, mock.clone()).await;

        let env = call_public(ToolId::ResolveHandle, &gate, &key, &args(json!({"handle": "bob.test"})))
            .await
            .unwrap();
        assert_eq!(env.field("did").unwrap(), "did:plc:bob");
        assert!(factory.public_resolutions().is_empty());
        assert_eq!(mock.calls_to("com.atproto.identity.resolveHandle").len(), 1);
    }

    #[tokio::test]
    async fn convert_post_and_profile_urls() {
        let factory = Arc::new(MockClientFactory::new().with_did("alice.bsky.social", "did:plc:alice"));
        let gate = gate(factory);
        let key = SessionKey::from("s1");

        let env = call_public(
            ToolId::ConvertUrlToUri,
            &gate,
            &key,
            &args(json!({"url": "https://bsky.app/profile/alice.bsky.social/post/3kabc"})),
        )
        .await
        .unwrap();
        assert_eq!(env.field("uri").unwrap(), "at://did:plc:alice/app.bsky.feed.post/3kabc");

        let env = call_public(
            ToolId::ConvertUrlToUri,
            &gate,
            &key,
            &args(json!({"url": "https://www.bsky.app/profile/did:plc:zed"})),
        )
        .await
        .unwrap();
        assert_eq!(env.field("uri").unwrap(), "at://did:plc:zed");
        assert_eq!(env.field("did").unwrap(), "did:plc:zed");
    }

    #[tokio::test]
    async fn convert_rejects_foreign_urls() {
        let gate = gate(Arc::new(MockClientFactory::new()));
        let err = call_public(
            ToolId::ConvertUrlToUri,
            &gate,
            &SessionKey::from("s1"),
            &args(json!({"url": "https://example.com/profile/x"})),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported URL format"));
    }

    #[tokio::test]
    async fn unresolvable_handle_is_upstream_error() {
        let gate = gate(Arc::new(MockClientFactory::new()));
        let err = call_public(
            ToolId::ResolveHandle,
            &gate,
            &SessionKey::from("s1"),
            &args(json!({"handle": "nobody.test"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "upstream");
    }

    #[test]
    fn pinned_feeds_prefer_v2_items() {
        let prefs = json!({"preferences": [
            {"$type": SAVED_FEEDS_V1, "pinned": ["at://old/app.bsky.feed.generator/x"]},
            {"$type": SAVED_FEEDS_V2, "items": [
                {"type": "timeline", "value": "following", "pinned": true},
                {"type": "feed", "value": "at://did:plc:f/app.bsky.feed.generator/a", "pinned": true},
                {"type": "feed", "value": "at://did:plc:f/app.bsky.feed.generator/b", "pinned": false},
            ]},
        ]});
        assert_eq!(
            pinned_feed_uris(&prefs),
            vec!["at://did:plc:f/app.bsky.feed.generator/a".to_string()]
        );

        let v1_only = json!({"preferences": [
            {"$type": SAVED_FEEDS_V1, "pinned": ["at://old/app.bsky.feed.generator/x"]},
        ]});
        assert_eq!(pinned_feed_uris(&v1_only), vec!["at://old/app.bsky.feed.generator/x".to_string()]);
        assert!(pinned_feed_uris(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn pinned_feeds_skip_failed_lookups() {
        let mock = Arc::new(MockClient::new("alice.test"));
        mock.respond(
            "app.bsky.actor.getPreferences",
            json!({"preferences": [{"$type": SAVED_FEEDS_V1, "pinned": ["at://a/app.bsky.feed.generator/1"]}]}),
        );
        mock.fail("app.bsky.feed.getFeedGenerator", 400, "UnknownFeed", "gone");
        let handle: ClientHandle = mock.clone();
        let env = get_pinned_feeds(&handle, &Args::default()).await.unwrap();
        assert_eq!(env.field("pinned_feeds").unwrap(), &json!([]));
    }
}
