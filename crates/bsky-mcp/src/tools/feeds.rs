//! Read-only feed, thread and search tools.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Value, json};

use super::{
    Access, DEFAULT_LIMIT, DEFAULT_SEARCH_LIMIT, Group, ToolDef, ToolId, bare_handle, cursor_prop,
    limit_prop, passthrough, query, schema, string_prop,
};
use crate::client::ClientHandle;
use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::params::{Args, Query, clamp_range};

const THREAD_DEPTH: i64 = 6;
const THREAD_PARENT_HEIGHT: i64 = 80;
const THREAD_MAX: i64 = 1000;

/// Feed sampled by `get_trends` (Bluesky's "Discover").
const TRENDS_SOURCE_FEED: &str = "at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.generator/whats-hot";
const TRENDS_SAMPLE: u32 = 100;
const TRENDS_TOP: usize = 20;
const HASHTAG_PATTERN: &str = r"#(\w+)";

pub(crate) fn definitions() -> Vec<ToolDef> {
    let g = Group::Feeds;
    let paged = |extra: Value, default: u32| {
        let mut props = extra;
        props["limit"] = limit_prop(default);
        props["cursor"] = cursor_prop();
        props
    };
    vec![
        ToolDef::new(
            ToolId::GetTimelinePosts,
            "get_timeline_posts",
            g,
            Access::Protected,
            "Get posts from the home timeline",
            schema(
                paged(
                    json!({ "algorithm": string_prop("Timeline algorithm, e.g. reverse-chronological") }),
                    DEFAULT_LIMIT,
                ),
                &[],
            ),
        ),
        ToolDef::new(
            ToolId::GetFeedPosts,
            "get_feed_posts",
            g,
            Access::Protected,
            "Get posts from a custom feed",
            schema(
                paged(json!({ "feed": string_prop("AT URI of the feed generator") }), DEFAULT_LIMIT),
                &["feed"],
            ),
        ),
        ToolDef::new(
            ToolId::GetListPosts,
            "get_list_posts",
            g,
            Access::Protected,
            "Get posts from a list feed",
            schema(
                paged(json!({ "list_uri": string_prop("AT URI of the list") }), DEFAULT_LIMIT),
                &["list_uri"],
            ),
        ),
        ToolDef::new(
            ToolId::GetUserPosts,
            "get_user_posts",
            g,
            Access::Protected,
            "Get posts authored by a user",
            schema(
                paged(
                    json!({
                        "handle": string_prop("Handle or DID (defaults to the logged-in account)"),
                        "filter": string_prop("posts_with_replies, posts_no_replies, posts_with_media or posts_and_author_threads"),
                    }),
                    DEFAULT_LIMIT,
                ),
                &[],
            ),
        ),
        ToolDef::new(
            ToolId::GetLikedPosts,
            "get_liked_posts",
            g,
            Access::Protected,
            "Get posts liked by the logged-in account",
            schema(paged(json!({}), DEFAULT_LIMIT), &[]),
        ),
        ToolDef::new(
            ToolId::GetPostThread,
            "get_post_thread",
            g,
            Access::Protected,
            "Get a post with its replies and parents",
            schema(
                json!({
                    "uri": string_prop("AT URI of the post"),
                    "depth": { "type": ["integer", "string"], "description": "Reply depth (0-1000, default 6)" },
                    "parent_height": { "type": ["integer", "string"], "description": "Parent height (0-1000, default 80)" },
                }),
                &["uri"],
            ),
        ),
        ToolDef::new(
            ToolId::GetLikes,
            "get_likes",
            g,
            Access::Protected,
            "List accounts that liked a post",
            schema(
                paged(
                    json!({ "uri": string_prop("AT URI of the post"), "cid": string_prop("Optional CID of the post") }),
                    DEFAULT_LIMIT,
                ),
                &["uri"],
            ),
        ),
        ToolDef::new(
            ToolId::GetRepostedBy,
            "get_reposted_by",
            g,
            Access::Protected,
            "List accounts that reposted a post",
            schema(
                paged(
                    json!({ "uri": string_prop("AT URI of the post"), "cid": string_prop("Optional CID of the post") }),
                    DEFAULT_LIMIT,
                ),
                &["uri"],
            ),
        ),
        ToolDef::new(
            ToolId::SearchPosts,
            "search_posts",
            g,
            Access::Protected,
            "Search posts",
            schema(
                paged(
                    json!({
                        "query": string_prop("Search text"),
                        "sort": string_prop("top (default) or latest"),
                    }),
                    DEFAULT_SEARCH_LIMIT,
                ),
                &["query"],
            ),
        ),
        ToolDef::new(
            ToolId::SearchFeeds,
            "search_feeds",
            g,
            Access::Protected,
            "Search custom feeds",
            schema(
                paged(json!({ "query": string_prop("Search text") }), DEFAULT_SEARCH_LIMIT),
                &["query"],
            ),
        ),
        ToolDef::new(
            ToolId::GetTrends,
            "get_trends",
            g,
            Access::Protected,
            "Top hashtags across currently popular posts",
            schema(json!({}), &[]),
        ),
    ]
}

pub(crate) async fn get_timeline_posts(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .opt("algorithm", args.opt_str("algorithm"))
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.feed.getTimeline", params, "Failed to get timeline").await?;
    Ok(passthrough(response))
}

pub(crate) async fn get_feed_posts(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("feed", args.require("feed")?)
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.feed.getFeed", params, "Failed to get feed").await?;
    Ok(passthrough(response))
}

/// `list_uri`, or the bare `list` accepted by older callers.
fn list_uri(args: &Args) -> Result<String, ToolError> {
    match args.opt_str("list") {
        Some(list) if args.opt_str("list_uri").is_none() => Ok(list),
        _ => args.require("list_uri"),
    }
}

pub(crate) async fn get_list_posts(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("list", list_uri(args)?)
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.feed.getListFeed", params, "Failed to get list feed").await?;
    Ok(passthrough(response))
}

pub(crate) async fn get_user_posts(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let actor = args
        .opt_str("handle")
        .map(|h| bare_handle(&h).to_string())
        .unwrap_or_else(|| client.identity().did.clone());
    let params = Query::new()
        .push("actor", actor)
        .opt("filter", args.opt_str("filter"))
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.feed.getAuthorFeed", params, "Failed to get user posts").await?;
    Ok(passthrough(response))
}

pub(crate) async fn get_liked_posts(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("actor", &client.identity().did)
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.feed.getActorLikes", params, "Failed to get liked posts").await?;
    Ok(passthrough(response))
}

pub(crate) async fn get_post_thread(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("uri", args.require("uri")?)
        .push("depth", clamp_range(args.get("depth"), 0, THREAD_MAX, THREAD_DEPTH))
        .push(
            "parentHeight",
            clamp_range(args.get("parent_height"), 0, THREAD_MAX, THREAD_PARENT_HEIGHT),
        );
    let response = query(client, "app.bsky.feed.getPostThread", params, "Failed to get post thread").await?;
    Ok(passthrough(response))
}

pub(crate) async fn get_likes(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("uri", args.require("uri")?)
        .opt("cid", args.opt_str("cid"))
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.feed.getLikes", params, "Failed to get likes").await?;
    Ok(passthrough(response))
}

pub(crate) async fn get_reposted_by(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("uri", args.require("uri")?)
        .opt("cid", args.opt_str("cid"))
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.feed.getRepostedBy", params, "Failed to get reposts").await?;
    Ok(passthrough(response))
}

/// Map the user-facing sort name onto the API's `top` / `latest`.
fn search_sort(raw: Option<String>) -> &'static str {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("latest") | Some("recent") => "latest",
        _ => "top",
    }
}

pub(crate) async fn search_posts(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("q", args.require("query")?)
        .push("sort", search_sort(args.opt_str("sort")))
        .page(args, DEFAULT_SEARCH_LIMIT);
    let response = query(client, "app.bsky.feed.searchPosts", params, "Failed to search posts").await?;
    Ok(Envelope::ok(json!({ "search_results": response })))
}

pub(crate) async fn search_feeds(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("query", args.require("query")?)
        .page(args, DEFAULT_SEARCH_LIMIT);
    let response = query(
        client,
        "app.bsky.unspecced.getPopularFeedGenerators",
        params,
        "Failed to search feeds",
    )
    .await?;
    Ok(passthrough(response))
}

/// Hashtag counts over `texts`, case-folded, most frequent first.
fn count_hashtags<'a>(pattern: &Regex, texts: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for tag in pattern.captures_iter(text).filter_map(|c| c.get(1)) {
            *counts.entry(tag.as_str().to_lowercase()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|(a, x), (b, y)| y.cmp(x).then_with(|| a.cmp(b)));
    ranked
}

pub(crate) async fn get_trends(client: &ClientHandle, _args: &Args) -> Result<Envelope, ToolError> {
    let pattern =
        Regex::new(HASHTAG_PATTERN).map_err(|e| ToolError::Rejected(format!("Failed to get trends: {e}")))?;
    let params = Query::new()
        .push("feed", TRENDS_SOURCE_FEED)
        .push("limit", TRENDS_SAMPLE);
    let popular = query(client, "app.bsky.feed.getFeed", params, "Failed to get trends").await?;

    let texts = popular
        .get("feed")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.pointer("/post/record/text").and_then(Value::as_str));
    let trends: Vec<Value> = count_hashtags(&pattern, texts)
        .into_iter()
        .take(TRENDS_TOP)
        .map(|(tag, count)| json!({ "tag": tag, "count": count }))
        .collect();
    Ok(Envelope::ok(json!({ "trends": trends })))
}
