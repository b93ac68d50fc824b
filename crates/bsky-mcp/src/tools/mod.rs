//! MCP tool catalogue and dispatch.
//!
//! Every tool is described by a [`ToolDef`] (name, group, JSON schema) and
//! falls into one of three [`Access`] classes:
//!
//! - **Session** tools (`login`, `logout`, ...) talk to the [`AuthGate`]
//!   directly.
//! - **Public** tools work without a session and use one opportunistically.
//! - **Protected** tools run through [`AuthGate::run`], which guarantees an
//!   authenticated client before the tool body executes.
//!
//! Tool bodies live in the per-group modules and return
//! `Result<Envelope, ToolError>`; the gate turns errors into error envelopes.

mod auth;
mod feeds;
mod moderation;
mod notifications;
mod posts;
mod profiles;
mod utility;

use async_trait::async_trait;
use bsky_mcp_core::record;
use bsky_mcp_core::{AtUri, XrpcError};
use serde_json::{Value, json};

use crate::client::ClientHandle;
use crate::envelope::Envelope;
use crate::error::{ToolError, UpstreamContext};
use crate::gate::{AuthGate, ProtectedOperation};
use crate::params::{Args, Query};
use crate::session::SessionKey;

/// URI of the catalogue resource.
pub const CATALOGUE_URI: &str = "info://bluesky-tools";

/// Default page size for listing tools.
pub(crate) const DEFAULT_LIMIT: u32 = 50;
/// Default page size for search tools.
pub(crate) const DEFAULT_SEARCH_LIMIT: u32 = 25;

/// How a tool obtains its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Manages the session itself.
    Session,
    /// Works without a session.
    Public,
    /// Requires an authenticated session.
    Protected,
}

/// Catalogue grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    /// Session management.
    Authentication,
    /// Profiles, follows, handle resolution.
    Profiles,
    /// Timelines, feeds, threads, search.
    Feeds,
    /// Creating and removing posts, likes, reposts.
    Posting,
    /// Blocks and mutes.
    Moderation,
    /// Notifications.
    Notifications,
    /// URL conversion and preferences.
    Utilities,
}

impl Group {
    /// Heading used in the catalogue.
    pub fn label(self) -> &'static str {
        match self {
            Self::Authentication => "Authentication",
            Self::Profiles => "Profiles & graph",
            Self::Feeds => "Feeds & posts",
            Self::Posting => "Posting",
            Self::Moderation => "Moderation",
            Self::Notifications => "Notifications",
            Self::Utilities => "Utilities",
        }
    }

    const ALL: [Group; 7] = [
        Self::Authentication,
        Self::Profiles,
        Self::Feeds,
        Self::Posting,
        Self::Moderation,
        Self::Notifications,
        Self::Utilities,
    ];
}

/// Identifies a tool body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolId {
    Login,
    Logout,
    CheckAuthStatus,
    CheckEnvironmentVariables,
    GetProfile,
    GetFollows,
    GetFollowers,
    FollowUser,
    UnfollowUser,
    SearchPeople,
    ResolveHandle,
    GetTimelinePosts,
    GetFeedPosts,
    GetListPosts,
    GetUserPosts,
    GetLikedPosts,
    GetPostThread,
    GetLikes,
    GetRepostedBy,
    SearchPosts,
    SearchFeeds,
    GetTrends,
    CreatePost,
    LikePost,
    UnlikePost,
    RepostPost,
    UnrepostPost,
    DeletePost,
    BlockUser,
    UnblockUser,
    GetBlocks,
    MuteUser,
    UnmuteUser,
    GetMutes,
    GetNotifications,
    CountUnreadNotifications,
    MarkNotificationsSeen,
    GetNotificationPreferences,
    ConvertUrlToUri,
    GetPinnedFeeds,
}

/// One catalogue entry.
#[derive(Debug, Clone)]
pub struct ToolDef {
    /// Body to run.
    pub id: ToolId,
    /// MCP tool name.
    pub name: &'static str,
    /// Catalogue group.
    pub group: Group,
    /// Session requirement.
    pub access: Access,
    /// One-line description.
    pub description: &'static str,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
}

impl ToolDef {
    pub(crate) fn new(
        id: ToolId,
        name: &'static str,
        group: Group,
        access: Access,
        description: &'static str,
        input_schema: Value,
    ) -> Self {
        Self {
            id,
            name,
            group,
            access,
            description,
            input_schema,
        }
    }

    /// `tools/list` entry.
    pub fn to_mcp(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// Object schema from a `properties` map and required keys.
pub(crate) fn schema(properties: Value, required: &[&str]) -> Value {
    let mut s = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        s["required"] = json!(required);
    }
    s
}

pub(crate) fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

pub(crate) fn limit_prop(default: u32) -> Value {
    json!({
        "type": ["integer", "string"],
        "description": format!("Maximum number of results (1-100, default {default})"),
    })
}

pub(crate) fn cursor_prop() -> Value {
    string_prop("Pagination cursor from a previous response")
}

/// All tools, in catalogue order.
#[derive(Debug, Clone)]
pub struct ToolSet {
    defs: Vec<ToolDef>,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSet {
    /// Build the full catalogue.
    pub fn new() -> Self {
        let mut defs = Vec::new();
        defs.extend(auth::definitions());
        defs.extend(profiles::definitions());
        defs.extend(feeds::definitions());
        defs.extend(posts::definitions());
        defs.extend(moderation::definitions());
        defs.extend(notifications::definitions());
        defs.extend(utility::definitions());
        Self { defs }
    }

    /// Every tool definition.
    pub fn defs(&self) -> &[ToolDef] {
        &self.defs
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    /// `tools/list` payload.
    pub fn list(&self) -> Vec<Value> {
        self.defs.iter().map(ToolDef::to_mcp).collect()
    }

    /// Human-readable catalogue served as the `info://bluesky-tools` resource.
    pub fn catalogue(&self) -> String {
        let mut out = String::from("Bluesky MCP tools\n");
        for group in Group::ALL {
            let tools: Vec<&ToolDef> = self.defs.iter().filter(|d| d.group == group).collect();
            if tools.is_empty() {
                continue;
            }
            out.push_str(&format!("\n## {}\n", group.label()));
            for def in tools {
                let note = match def.access {
                    Access::Public => " (no login required)",
                    _ => "",
                };
                out.push_str(&format!("- {}: {}{note}\n", def.name, def.description));
            }
        }
        out
    }

    /// Run tool `name`. Returns `None` for unknown tools.
    pub async fn call(&self, gate: &AuthGate, key: &SessionKey, name: &str, args: Args) -> Option<Envelope> {
        let def = self.get(name)?;
        tracing::debug!(session = %key, tool = def.name, "tool call");
        let envelope = match def.access {
            Access::Session => auth::call(def.id, gate, key, &args).await,
            Access::Public => utility::call_public(def.id, gate, key, &args).await.into(),
            Access::Protected => {
                let op = Proxied {
                    id: def.id,
                    name: def.name,
                };
                gate.run(key, &op, &args).await
            }
        };
        Some(envelope)
    }
}

/// A protected tool, dispatched by id.
struct Proxied {
    id: ToolId,
    name: &'static str,
}

#[async_trait]
impl ProtectedOperation for Proxied {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
        use ToolId::*;
        match self.id {
            GetProfile => profiles::get_profile(client, args).await,
            GetFollows => profiles::get_follows(client, args).await,
            GetFollowers => profiles::get_followers(client, args).await,
            FollowUser => profiles::follow_user(client, args).await,
            UnfollowUser => profiles::unfollow_user(client, args).await,
            SearchPeople => profiles::search_people(client, args).await,
            GetTimelinePosts => feeds::get_timeline_posts(client, args).await,
            GetFeedPosts => feeds::get_feed_posts(client, args).await,
            GetListPosts => feeds::get_list_posts(client, args).await,
            GetUserPosts => feeds::get_user_posts(client, args).await,
            GetLikedPosts => feeds::get_liked_posts(client, args).await,
            GetPostThread => feeds::get_post_thread(client, args).await,
            GetLikes => feeds::get_likes(client, args).await,
            GetRepostedBy => feeds::get_reposted_by(client, args).await,
            SearchPosts => feeds::search_posts(client, args).await,
            SearchFeeds => feeds::search_feeds(client, args).await,
            GetTrends => feeds::get_trends(client, args).await,
            CreatePost => posts::create_post(client, args).await,
            LikePost => posts::like_post(client, args).await,
            UnlikePost => posts::unlike_post(client, args).await,
            RepostPost => posts::repost_post(client, args).await,
            UnrepostPost => posts::unrepost_post(client, args).await,
            DeletePost => posts::delete_post(client, args).await,
            BlockUser => moderation::block_user(client, args).await,
            UnblockUser => moderation::unblock_user(client, args).await,
            GetBlocks => moderation::get_blocks(client, args).await,
            MuteUser => moderation::mute_user(client, args).await,
            UnmuteUser => moderation::unmute_user(client, args).await,
            GetMutes => moderation::get_mutes(client, args).await,
            GetNotifications => notifications::get_notifications(client, args).await,
            CountUnreadNotifications => notifications::count_unread(client, args).await,
            MarkNotificationsSeen => notifications::mark_seen(client, args).await,
            GetNotificationPreferences => notifications::get_preferences(client, args).await,
            GetPinnedFeeds => utility::get_pinned_feeds(client, args).await,
            Login | Logout | CheckAuthStatus | CheckEnvironmentVariables | ResolveHandle
            | ConvertUrlToUri => Err(ToolError::Rejected(format!(
                "{} is not a protected tool",
                self.name
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Strip a leading `@` from a handle.
pub(crate) fn bare_handle(actor: &str) -> &str {
    actor.trim().trim_start_matches('@')
}

/// DID for `actor`, resolving handles through the session.
pub(crate) async fn resolve_actor(client: &ClientHandle, actor: &str) -> Result<String, ToolError> {
    let actor = bare_handle(actor);
    if actor.starts_with("did:") {
        return Ok(actor.to_string());
    }
    let resolved = client
        .query(
            "com.atproto.identity.resolveHandle",
            Query::new().push("handle", actor).as_slice(),
        )
        .await
        .upstream(&format!("Failed to resolve handle @{actor}"))?;
    string_field(&resolved, "did").ok_or_else(|| {
        ToolError::upstream(
            format!("Failed to resolve handle @{actor}"),
            XrpcError::Decode {
                nsid: "com.atproto.identity.resolveHandle".to_string(),
                detail: "missing 'did'".to_string(),
            },
        )
    })
}

/// Run an XRPC query with `context` attached to failures.
pub(crate) async fn query(
    client: &ClientHandle,
    nsid: &str,
    params: Query,
    context: &str,
) -> Result<Value, ToolError> {
    client.query(nsid, params.as_slice()).await.upstream(context)
}

/// Create `record` in the caller's repository; returns `(uri, cid)`.
pub(crate) async fn create_record(
    client: &ClientHandle,
    collection: &str,
    record: Value,
    context: &str,
) -> Result<(String, String), ToolError> {
    let body = record::create_record_body(&client.identity().did, collection, record);
    let created = client
        .procedure("com.atproto.repo.createRecord", Some(body))
        .await
        .upstream(context)?;
    Ok((
        string_field(&created, "uri").unwrap_or_default(),
        string_field(&created, "cid").unwrap_or_default(),
    ))
}

/// Delete the record at `uri` from the caller's repository.
pub(crate) async fn delete_record(client: &ClientHandle, uri: &AtUri, context: &str) -> Result<(), ToolError> {
    let (Some(collection), Some(rkey)) = (&uri.collection, &uri.rkey) else {
        return Err(ToolError::InvalidArguments(format!("'{uri}' is not a record URI")));
    };
    let body = record::delete_record_body(&client.identity().did, collection, rkey);
    client
        .procedure("com.atproto.repo.deleteRecord", Some(body))
        .await
        .upstream(context)?;
    Ok(())
}

/// Parse a required AT URI argument.
pub(crate) fn at_uri_arg(args: &Args, key: &str) -> Result<AtUri, ToolError> {
    args.require(key)?
        .parse::<AtUri>()
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// String field of a JSON object.
pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Success envelope that carries `response` verbatim.
pub(crate) fn passthrough(response: Value) -> Envelope {
    Envelope::ok(response)
}
