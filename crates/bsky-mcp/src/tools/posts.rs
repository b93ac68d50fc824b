//! Posting, likes and reposts.

use bsky_mcp_core::AtUri;
use bsky_mcp_core::record::{self, LIKE, LinkSpec, POST, PostDraft, REPOST, ReplyRef, StrongRef};
use serde_json::{Map, Value, json};

use super::{
    Access, Group, ToolDef, ToolId, at_uri_arg, create_record, delete_record, query, schema,
    string_prop,
};
use crate::client::ClientHandle;
use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::params::{Args, Query};

pub(crate) fn definitions() -> Vec<ToolDef> {
    let g = Group::Posting;
    let strong_ref = || {
        json!({
            "type": "object",
            "properties": {
                "uri": string_prop("AT URI of the post"),
                "cid": string_prop("CID of the post"),
            },
            "required": ["uri", "cid"],
        })
    };
    let post_ref = |what: &str| {
        schema(
            json!({
                "uri": string_prop(&format!("AT URI of the post to {what}")),
                "cid": string_prop(&format!("CID of the post to {what}")),
            }),
            &["uri", "cid"],
        )
    };
    vec![
        ToolDef::new(
            ToolId::CreatePost,
            "create_post",
            g,
            Access::Protected,
            "Create a post, optionally as a reply or quote, with link facets",
            schema(
                json!({
                    "text": string_prop("Post text"),
                    "reply_to": {
                        "type": "object",
                        "description": "Parent post; root_uri/root_cid default to the parent",
                        "properties": {
                            "uri": string_prop("AT URI of the parent post"),
                            "cid": string_prop("CID of the parent post"),
                            "root_uri": string_prop("AT URI of the thread root"),
                            "root_cid": string_prop("CID of the thread root"),
                        },
                        "required": ["uri", "cid"],
                    },
                    "quotes": strong_ref(),
                    "links": {
                        "type": "array",
                        "description": "Links to annotate; text defaults to the URL",
                        "items": {
                            "type": "object",
                            "properties": {
                                "url": string_prop("Link target"),
                                "text": string_prop("Span of the post text to link"),
                            },
                            "required": ["url"],
                        },
                    },
                }),
                &["text"],
            ),
        ),
        ToolDef::new(
            ToolId::LikePost,
            "like_post",
            g,
            Access::Protected,
            "Like a post",
            post_ref("like"),
        ),
        ToolDef::new(
            ToolId::UnlikePost,
            "unlike_post",
            g,
            Access::Protected,
            "Remove a like, given the post URI or the like record URI",
            schema(
                json!({
                    "uri": string_prop("AT URI of the post or of the like record"),
                    "cid": string_prop("CID of the post (unused)"),
                }),
                &["uri"],
            ),
        ),
        ToolDef::new(
            ToolId::RepostPost,
            "repost_post",
            g,
            Access::Protected,
            "Repost a post",
            post_ref("repost"),
        ),
        ToolDef::new(
            ToolId::UnrepostPost,
            "unrepost_post",
            g,
            Access::Protected,
            "Remove a repost, given the post URI or the repost record URI",
            schema(
                json!({
                    "uri": string_prop("AT URI of the post or of the repost record"),
                    "cid": string_prop("CID of the post (unused)"),
                }),
                &["uri"],
            ),
        ),
        ToolDef::new(
            ToolId::DeletePost,
            "delete_post",
            g,
            Access::Protected,
            "Delete one of your own posts",
            schema(json!({ "uri": string_prop("AT URI of the post") }), &["uri"]),
        ),
    ]
}

fn str_of(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn strong_ref_of(map: &Map<String, Value>, uri_key: &str, cid_key: &str) -> Option<StrongRef> {
    Some(StrongRef {
        uri: str_of(map, uri_key)?,
        cid: str_of(map, cid_key)?,
    })
}

/// Assemble a [`PostDraft`] from `create_post` arguments.
fn draft_from_args(args: &Args) -> Result<PostDraft, ToolError> {
    let text = args.require("text")?;

    let reply = match args.object("reply_to") {
        Some(map) => {
            let parent = strong_ref_of(map, "uri", "cid").ok_or_else(|| {
                ToolError::InvalidArguments("reply_to requires 'uri' and 'cid'".to_string())
            })?;
            Some(ReplyRef {
                root: strong_ref_of(map, "root_uri", "root_cid"),
                parent,
            })
        }
        None => None,
    };

    let quote = match args.object("quotes").or_else(|| args.object("quote")) {
        Some(map) => Some(strong_ref_of(map, "uri", "cid").ok_or_else(|| {
            ToolError::InvalidArguments("quotes requires 'uri' and 'cid'".to_string())
        })?),
        None => None,
    };

    let links = args
        .list("links")
        .iter()
        .filter_map(|item| match item {
            Value::String(url) => Some(LinkSpec {
                url: url.clone(),
                text: None,
            }),
            Value::Object(map) => str_of(map, "url").map(|url| LinkSpec {
                url,
                text: str_of(map, "text"),
            }),
            _ => None,
        })
        .collect();

    Ok(PostDraft {
        text,
        reply,
        quote,
        links,
    })
}

pub(crate) async fn create_post(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let draft = draft_from_args(args)?;
    let post = record::post_record(&draft, &record::now_timestamp());
    let (uri, cid) = create_record(client, POST, post, "Failed to create post").await?;
    tracing::info!(uri = %uri, "post created");
    Ok(Envelope::ok(json!({
        "message": "Post created successfully",
        "post_uri": uri,
        "post_cid": cid,
    })))
}

fn subject_from_args(args: &Args) -> Result<StrongRef, ToolError> {
    Ok(StrongRef {
        uri: args.require("uri")?,
        cid: args.require("cid")?,
    })
}

pub(crate) async fn like_post(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let subject = subject_from_args(args)?;
    let like = record::subject_ref_record(LIKE, &subject, &record::now_timestamp());
    let (uri, cid) = create_record(client, LIKE, like, "Failed to like post").await?;
    Ok(Envelope::ok(json!({
        "message": "Post liked successfully",
        "like_uri": uri,
        "like_cid": cid,
    })))
}

pub(crate) async fn repost_post(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let subject = subject_from_args(args)?;
    let repost = record::subject_ref_record(REPOST, &subject, &record::now_timestamp());
    let (uri, cid) = create_record(client, REPOST, repost, "Failed to repost").await?;
    Ok(Envelope::ok(json!({
        "message": "Post reposted successfully",
        "repost_uri": uri,
        "repost_cid": cid,
    })))
}

/// Find the caller's `collection` record pointing at `target`.
///
/// `target` may already be that record; otherwise it must be a post, and the
/// record is read from the post's `viewer` state.
async fn own_record_for(
    client: &ClientHandle,
    target: &AtUri,
    collection: &str,
    viewer_field: &str,
    context: &str,
) -> Result<Option<AtUri>, ToolError> {
    match target.collection.as_deref() {
        Some(c) if c == collection => return Ok(Some(target.clone())),
        Some(POST) => {}
        _ => {
            return Err(ToolError::InvalidArguments(format!(
                "'{target}' is neither a post nor a {collection} record"
            )));
        }
    }
    let response = query(
        client,
        "app.bsky.feed.getPosts",
        Query::new().push("uris", target),
        context,
    )
    .await?;
    let found = response
        .get("posts")
        .and_then(Value::as_array)
        .and_then(|posts| posts.first())
        .and_then(|post| post.get("viewer"))
        .and_then(|viewer| viewer.get(viewer_field))
        .and_then(Value::as_str)
        .and_then(|uri| uri.parse::<AtUri>().ok());
    Ok(found)
}

pub(crate) async fn unlike_post(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let target = at_uri_arg(args, "uri")?;
    let context = "Failed to unlike post";
    let Some(like) = own_record_for(client, &target, LIKE, "like", context).await? else {
        return Err(ToolError::Rejected("You have not liked this post".to_string()));
    };
    delete_record(client, &like, context).await?;
    Ok(Envelope::ok(json!({ "message": "Post unliked successfully" })))
}

pub(crate) async fn unrepost_post(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let target = at_uri_arg(args, "uri")?;
    let context = "Failed to unrepost";
    let Some(repost) = own_record_for(client, &target, REPOST, "repost", context).await? else {
        return Err(ToolError::Rejected("You have not reposted this post".to_string()));
    };
    delete_record(client, &repost, context).await?;
    Ok(Envelope::ok(json!({ "message": "Post unreposted successfully" })))
}

pub(crate) async fn delete_post(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let uri = at_uri_arg(args, "uri")?;
    let me = client.identity();
    if uri.authority != me.did && uri.authority != me.handle {
        return Err(ToolError::Rejected("You can only delete your own posts".to_string()));
    }
    if uri.collection.as_deref() != Some(POST) {
        return Err(ToolError::InvalidArguments(format!("'{uri}' is not a post URI")));
    }
    delete_record(client, &uri, "Failed to delete post").await?;
    Ok(Envelope::ok(json!({ "message": "Post deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use std::sync::Arc;

    const MY_POST: &str = "at://did:plc:alice.test/app.bsky.feed.post/3kpost";
    const OTHER_POST: &str = "at://did:plc:bob/app.bsky.feed.post/3kother";

    fn client() -> (Arc<MockClient>, ClientHandle) {
        let mock = Arc::new(MockClient::new("alice.test"));
        let handle: ClientHandle = mock.clone();
        (mock, handle)
    }

    fn args(v: Value) -> Args {
        Args::new(Some(v))
    }

    fn created_record(mock: &MockClient) -> Value {
        mock.calls_to("com.atproto.repo.createRecord")[0]
            .body
            .clone()
            .unwrap()
    }

    #[tokio::test]
    async fn create_post_requires_text() {
        let (mock, handle) = client();
        let err = create_post(&handle, &args(json!({"text": "   "}))).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
        assert!(mock.get_calls().is_empty());
    }

    #[tokio::test]
    async fn create_post_plain_text() {
        let (mock, handle) = client();
        mock.respond(
            "com.atproto.repo.createRecord",
            json!({"uri": MY_POST, "cid": "bafy"}),
        );
        let env = create_post(&handle, &args(json!({"text": "hello"}))).await.unwrap();
        assert_eq!(env.message(), Some("Post created successfully"));
        assert_eq!(env.field("post_uri").unwrap(), MY_POST);
        assert_eq!(env.field("post_cid").unwrap(), "bafy");

        let body = created_record(&mock);
        assert_eq!(body["collection"], POST);
        assert_eq!(body["record"]["text"], "hello");
        assert!(body["record"].get("reply").is_none());
    }

    #[tokio::test]
    async fn create_post_reply_quote_and_links() {
        let (mock, handle) = client();
        create_post(
            &handle,
            &args(json!({
                "text": "see example.com",
                "reply_to": {"uri": OTHER_POST, "cid": "p"},
                "quotes": {"uri": OTHER_POST, "cid": "q"},
                "links": [{"url": "https://example.com", "text": "example.com"}],
            })),
        )
        .await
        .unwrap();
        let record = &created_record(&mock)["record"];
        assert_eq!(record["reply"]["root"]["cid"], "p");
        assert_eq!(record["reply"]["parent"]["cid"], "p");
        assert_eq!(record["embed"]["record"]["cid"], "q");
        assert_eq!(record["facets"][0]["index"]["byteStart"], 4);
    }

    #[tokio::test]
    async fn create_post_reply_needs_parent() {
        let (_, handle) = client();
        let err = create_post(&handle, &args(json!({"text": "hi", "reply_to": {"uri": OTHER_POST}})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reply_to"));
    }

    #[tokio::test]
    async fn like_creates_subject_record() {
        let (mock, handle) = client();
        let env = like_post(&handle, &args(json!({"uri": OTHER_POST, "cid": "c"})))
            .await
            .unwrap();
        assert_eq!(env.message(), Some("Post liked successfully"));
        let body = created_record(&mock);
        assert_eq!(body["collection"], LIKE);
        assert_eq!(body["record"]["subject"]["uri"], OTHER_POST);
    }

    #[tokio::test]
    async fn unlike_by_post_uri_reads_viewer_state() {
        let (mock, handle) = client();
        mock.respond(
            "app.bsky.feed.getPosts",
            json!({"posts": [{"viewer": {"like": "at://did:plc:alice.test/app.bsky.feed.like/3klike"}}]}),
        );
        let env = unlike_post(&handle, &args(json!({"uri": OTHER_POST}))).await.unwrap();
        assert_eq!(env.message(), Some("Post unliked successfully"));
        let delete = &mock.calls_to("com.atproto.repo.deleteRecord")[0];
        let body = delete.body.as_ref().unwrap();
        assert_eq!(body["collection"], LIKE);
        assert_eq!(body["rkey"], "3klike");
    }

    #[tokio::test]
    async fn unlike_by_record_uri_deletes_directly() {
        let (mock, handle) = client();
        unlike_post(
            &handle,
            &args(json!({"uri": "at://did:plc:alice.test/app.bsky.feed.like/3klike"})),
        )
        .await
        .unwrap();
        assert!(mock.calls_to("app.bsky.feed.getPosts").is_empty());
        assert_eq!(mock.calls_to("com.atproto.repo.deleteRecord").len(), 1);
    }

    #[tokio::test]
    async fn unrepost_without_repost_is_rejected() {
        let (mock, handle) = client();
        mock.respond("app.bsky.feed.getPosts", json!({"posts": [{"viewer": {}}]}));
        let err = unrepost_post(&handle, &args(json!({"uri": OTHER_POST}))).await.unwrap_err();
        assert_eq!(err.kind(), "rejected");
        assert!(mock.calls_to("com.atproto.repo.deleteRecord").is_empty());
    }

    #[tokio::test]
    async fn delete_post_refuses_other_repos() {
        let (mock, handle) = client();
        let err = delete_post(&handle, &args(json!({"uri": OTHER_POST}))).await.unwrap_err();
        assert_eq!(err.to_string(), "You can only delete your own posts");
        assert!(mock.get_calls().is_empty());

        let env = delete_post(&handle, &args(json!({"uri": MY_POST}))).await.unwrap();
        assert_eq!(env.message(), Some("Post deleted successfully"));
        let body = mock.calls_to("com.atproto.repo.deleteRecord")[0].body.clone().unwrap();
        assert_eq!(body["rkey"], "3kpost");
        assert_eq!(body["repo"], "did:plc:alice.test");
    }

    #[tokio::test]
    async fn delete_post_rejects_malformed_uri() {
        let (_, handle) = client();
        let err = delete_post(&handle, &args(json!({"uri": "https://bsky.app/x"}))).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }
}
