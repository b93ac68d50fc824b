//! Blocks and mutes.

use bsky_mcp_core::AtUri;
use bsky_mcp_core::record::{self, BLOCK};
use serde_json::{Value, json};

use super::{
    Access, DEFAULT_LIMIT, Group, ToolDef, ToolId, bare_handle, create_record, cursor_prop,
    delete_record, limit_prop, passthrough, query, resolve_actor, schema, string_prop,
};
use crate::client::ClientHandle;
use crate::envelope::Envelope;
use crate::error::{ToolError, UpstreamContext};
use crate::params::{Args, Query};

/// Pages of block records scanned by `unblock_user`.
const BLOCK_SCAN_PAGES: usize = 10;
const BLOCK_SCAN_PAGE_SIZE: u32 = 100;

pub(crate) fn definitions() -> Vec<ToolDef> {
    let g = Group::Moderation;
    let target = |what: &str| {
        let handle = string_prop(&format!("Handle or DID to {what}"));
        schema(json!({ "handle": handle }), &["handle"])
    };
    let page = || {
        schema(
            json!({ "limit": limit_prop(DEFAULT_LIMIT), "cursor": cursor_prop() }),
            &[],
        )
    };
    vec![
        ToolDef::new(ToolId::BlockUser, "block_user", g, Access::Protected, "Block a user", target("block")),
        ToolDef::new(
            ToolId::UnblockUser,
            "unblock_user",
            g,
            Access::Protected,
            "Remove a block on a user",
            target("unblock"),
        ),
        ToolDef::new(ToolId::GetBlocks, "get_blocks", g, Access::Protected, "List blocked accounts", page()),
        ToolDef::new(ToolId::MuteUser, "mute_user", g, Access::Protected, "Mute a user", target("mute")),
        ToolDef::new(
            ToolId::UnmuteUser,
            "unmute_user",
            g,
            Access::Protected,
            "Unmute a user",
            target("unmute"),
        ),
        ToolDef::new(ToolId::GetMutes, "get_mutes", g, Access::Protected, "List muted accounts", page()),
    ]
}

pub(crate) async fn block_user(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let handle = args.require("handle")?;
    let did = resolve_actor(client, &handle).await?;
    let block = record::subject_did_record(BLOCK, &did, &record::now_timestamp());
    let (uri, _) = create_record(client, BLOCK, block, "Failed to block user").await?;
    Ok(Envelope::ok(json!({
        "message": format!("Blocked user @{}", bare_handle(&handle)),
        "block_uri": uri,
    })))
}

/// Scan the caller's block records for one whose subject is `did`.
async fn find_block(client: &ClientHandle, did: &str) -> Result<Option<AtUri>, ToolError> {
    let repo = client.identity().did.clone();
    let mut cursor: Option<String> = None;
    for _ in 0..BLOCK_SCAN_PAGES {
        let params = Query::new()
            .push("repo", &repo)
            .push("collection", BLOCK)
            .push("limit", BLOCK_SCAN_PAGE_SIZE)
            .opt("cursor", cursor.take());
        let page = client
            .query("com.atproto.repo.listRecords", params.as_slice())
            .await
            .upstream("Failed to unblock user")?;
        let records = page.get("records").and_then(Value::as_array);
        let hit = records.into_iter().flatten().find_map(|r| {
            let subject = r.pointer("/value/subject").and_then(Value::as_str)?;
            (subject == did)
                .then(|| r.get("uri").and_then(Value::as_str))
                .flatten()
                .and_then(|uri| uri.parse::<AtUri>().ok())
        });
        if hit.is_some() {
            return Ok(hit);
        }
        cursor = page
            .get("cursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if cursor.is_none() {
            break;
        }
    }
    Ok(None)
}

pub(crate) async fn unblock_user(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let handle = args.require("handle")?;
    let name = bare_handle(&handle).to_string();
    let did = resolve_actor(client, &handle).await?;
    let Some(block) = find_block(client, &did).await? else {
        return Err(ToolError::Rejected(format!("No block record found for @{name}")));
    };
    delete_record(client, &block, "Failed to unblock user").await?;
    Ok(Envelope::ok(json!({ "message": format!("Unblocked user @{name}") })))
}

pub(crate) async fn get_blocks(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new().page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.graph.getBlocks", params, "Failed to get blocks").await?;
    Ok(passthrough(response))
}

async fn set_muted(client: &ClientHandle, args: &Args, muted: bool) -> Result<Envelope, ToolError> {
    let handle = args.require("handle")?;
    let did = resolve_actor(client, &handle).await?;
    let (nsid, context, verb) = if muted {
        ("app.bsky.graph.muteActor", "Failed to mute user", "Muted")
    } else {
        ("app.bsky.graph.unmuteActor", "Failed to unmute user", "Unmuted")
    };
    client
        .procedure(nsid, Some(json!({ "actor": did })))
        .await
        .upstream(context)?;
    Ok(Envelope::ok(json!({
        "message": format!("{verb} user @{}", bare_handle(&handle)),
    })))
}

pub(crate) async fn mute_user(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    set_muted(client, args, true).await
}

pub(crate) async fn unmute_user(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    set_muted(client, args, false).await
}

pub(crate) async fn get_mutes(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let params = Query::new().page(args, DEFAULT_LIMIT);
    let response = query(client, "app.bsky.graph.getMutes", params, "Failed to get mutes").await?;
    Ok(passthrough(response))
}
