//! Profile and follow-graph tools.

use bsky_mcp_core::AtUri;
use bsky_mcp_core::record::{self, FOLLOW};
use serde_json::json;

use super::{
    Access, DEFAULT_LIMIT, DEFAULT_SEARCH_LIMIT, Group, ToolDef, ToolId, bare_handle, create_record,
    cursor_prop, delete_record, limit_prop, passthrough, query, resolve_actor, schema, string_prop,
};
use crate::client::ClientHandle;
use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::params::{Args, Query};

pub(crate) fn definitions() -> Vec<ToolDef> {
    let g = Group::Profiles;
    let actor = || string_prop("Handle or DID (defaults to the logged-in account)");
    vec![
        ToolDef::new(
            ToolId::GetProfile,
            "get_profile",
            g,
            Access::Protected,
            "Get a user's profile",
            schema(json!({ "handle": actor() }), &[]),
        ),
        ToolDef::new(
            ToolId::GetFollows,
            "get_follows",
            g,
            Access::Protected,
            "List accounts a user follows",
            schema(
                json!({ "handle": actor(), "limit": limit_prop(DEFAULT_LIMIT), "cursor": cursor_prop() }),
                &[],
            ),
        ),
        ToolDef::new(
            ToolId::GetFollowers,
            "get_followers",
            g,
            Access::Protected,
            "List accounts following a user",
            schema(
                json!({ "handle": actor(), "limit": limit_prop(DEFAULT_LIMIT), "cursor": cursor_prop() }),
                &[],
            ),
        ),
        ToolDef::new(
            ToolId::FollowUser,
            "follow_user",
            g,
            Access::Protected,
            "Follow a user",
            schema(json!({ "handle": string_prop("Handle or DID to follow") }), &["handle"]),
        ),
        ToolDef::new(
            ToolId::UnfollowUser,
            "unfollow_user",
            g,
            Access::Protected,
            "Stop following a user",
            schema(json!({ "handle": string_prop("Handle or DID to unfollow") }), &["handle"]),
        ),
        ToolDef::new(
            ToolId::SearchPeople,
            "search_people",
            g,
            Access::Protected,
            "Search for accounts by name or handle",
            schema(
                json!({
                    "query": string_prop("Search text"),
                    "limit": limit_prop(DEFAULT_SEARCH_LIMIT),
                    "cursor": cursor_prop(),
                }),
                &["query"],
            ),
        ),
        ToolDef::new(
            ToolId::ResolveHandle,
            "resolve_handle",
            g,
            Access::Public,
            "Resolve a handle to its DID",
            schema(json!({ "handle": string_prop("Handle to resolve") }), &["handle"]),
        ),
    ]
}

/// Actor argument, defaulting to the logged-in account.
fn actor_or_self(client: &ClientHandle, args: &Args) -> String {
    args.opt_str("handle")
        .or_else(|| args.opt_str("actor"))
        .map(|h| bare_handle(&h).to_string())
        .unwrap_or_else(|| client.identity().did.clone())
}

pub(crate) async fn get_profile(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let actor = actor_or_self(client, args);
    let profile = query(
        client,
        "app.bsky.actor.getProfile",
        Query::new().push("actor", &actor),
        "Failed to get profile",
    )
    .await?;
    Ok(Envelope::ok(json!({ "profile": profile })))
}

pub(crate) async fn get_follows(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("actor", actor_or_self(client, args))
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.graph.getFollows", params, "Failed to get follows").await?;
    Ok(passthrough(response))
}

pub(crate) async fn get_followers(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("actor", actor_or_self(client, args))
        .page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.graph.getFollowers", params, "Failed to get followers").await?;
    Ok(passthrough(response))
}

pub(crate) async fn follow_user(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let handle = args.require("handle")?;
    let did = resolve_actor(client, &handle).await?;
    let record = record::subject_did_record(FOLLOW, &did, &record::now_timestamp());
    let (uri, cid) = create_record(client, FOLLOW, record, "Failed to follow user").await?;
    Ok(Envelope::ok(json!({
        "message": format!("Now following @{}", bare_handle(&handle)),
        "follow_uri": uri,
        "follow_cid": cid,
    })))
}

pub(crate) async fn unfollow_user(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let handle = args.require("handle")?;
    let actor = bare_handle(&handle).to_string();
    let profile = query(
        client,
        "app.bsky.actor.getProfile",
        Query::new().push("actor", &actor),
        "Failed to unfollow user",
    )
    .await?;
    let Some(follow_uri) = profile
        .pointer("/viewer/following")
        .and_then(|v| v.as_str())
    else {
        return Err(ToolError::Rejected(format!("You are not following @{actor}")));
    };
    let uri = follow_uri
        .parse::<AtUri>()
        .map_err(|e| ToolError::Rejected(format!("Unexpected follow record URI: {e}")))?;
    delete_record(client, &uri, "Failed to unfollow user").await?;
    Ok(Envelope::ok(json!({ "message": format!("Unfollowed @{actor}") })))
}

pub(crate) async fn search_people(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new()
        .push("q", args.require("query")?)
        .page(args, DEFAULT_SEARCH_LIMIT);
    let response = query(client, "app.bsky.actor.searchActors", params, "Failed to search people").await?;
    Ok(passthrough(response))
}
