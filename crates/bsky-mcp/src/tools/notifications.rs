//! Notification tools.

use bsky_mcp_core::record;
use serde_json::{Value, json};

use super::{Access, DEFAULT_LIMIT, Group, ToolDef, ToolId, cursor_prop, limit_prop, query, schema, string_prop};
use crate::client::ClientHandle;
use crate::envelope::Envelope;
use crate::error::{ToolError, UpstreamContext};
use crate::params::{Args, Query};

/// Filter names accepted by `get_notifications`, with the reason each maps to.
const FILTERS: [(&str, &str); 6] = [
    ("mentions", "mention"),
    ("replies", "reply"),
    ("quotes", "quote"),
    ("reposts", "repost"),
    ("follows", "follow"),
    ("likes", "like"),
];

const NOTIFICATION_PREF: &str = "app.bsky.actor.defs#notificationPref";

pub(crate) fn definitions() -> Vec<ToolDef> {
    let g = Group::Notifications;
    vec![
        ToolDef::new(
            ToolId::GetNotifications,
            "get_notifications",
            g,
            Access::Protected,
            "List notifications",
            schema(
                json!({
                    "limit": limit_prop(DEFAULT_LIMIT),
                    "cursor": cursor_prop(),
                    "seen_at": string_prop("RFC 3339 timestamp to treat as last seen"),
                    "filter": string_prop("mentions, replies, quotes, reposts, follows or likes"),
                }),
                &[],
            ),
        ),
        ToolDef::new(
            ToolId::CountUnreadNotifications,
            "count_unread_notifications",
            g,
            Access::Protected,
            "Count unread notifications",
            schema(json!({}), &[]),
        ),
        ToolDef::new(
            ToolId::MarkNotificationsSeen,
            "mark_notifications_seen",
            g,
            Access::Protected,
            "Mark all notifications as seen",
            schema(json!({}), &[]),
        ),
        ToolDef::new(
            ToolId::GetNotificationPreferences,
            "get_notification_preferences",
            g,
            Access::Protected,
            "Show notification preferences",
            schema(json!({}), &[]),
        ),
    ]
}

/// Notification reason for a user-facing filter name; unknown names are ignored.
fn reason_for(filter: &str) -> Option<&'static str> {
    let filter = filter.to_ascii_lowercase();
    FILTERS
        .iter()
        .find(|(name, reason)| *name == filter || *reason == filter)
        .map(|(_, reason)| *reason)
}

pub(crate) async fn get_notifications(client: &ClientHandle, args: &Args) -> Result<Envelope, ToolError> {
    let reason = args.opt_str("filter").as_deref().and_then(reason_for);
    let params = Query::new()
        .page(args, DEFAULT_LIMIT)
        .opt("seenAt", args.opt_str("seen_at"))
        .opt("reasons", reason);
    let response = query(
        client,
        "app.bsky.notification.listNotifications",
        params,
        "Failed to get notifications",
    )
    .await?;
    Ok(Envelope::ok(json!({ "notifications": response })))
}

pub(crate) async fn count_unread(client: &ClientHandle, _args: &Args) -> Result<Envelope, ToolError> {
    let response = query(
        client,
        "app.bsky.notification.getUnreadCount",
        Query::new(),
        "Failed to count unread notifications",
    )
    .await?;
    let count = response.get("count").and_then(Value::as_u64).unwrap_or(0);
    Ok(Envelope::ok(json!({ "count": count })))
}

pub(crate) async fn mark_seen(client: &ClientHandle, _args: &Args) -> Result<Envelope, ToolError> {
    let seen_at = record::now_timestamp();
    client
        .procedure("app.bsky.notification.updateSeen", Some(json!({ "seenAt": seen_at })))
        .await
        .upstream("Failed to mark notifications as seen")?;
    Ok(Envelope::ok(json!({
        "message": "Notifications marked as seen",
        "seen_at": seen_at,
    })))
}

/// The `notificationPref` entry of a `getPreferences` response, or
/// `{"enabled": true}` when the account has none.
fn notification_pref(preferences: &Value) -> Value {
    preferences
        .get("preferences")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|p| p.get("$type").and_then(Value::as_str) == Some(NOTIFICATION_PREF))
        .cloned()
        .unwrap_or_else(|| json!({ "enabled": true }))
}

pub(crate) async fn get_preferences(client: &ClientHandle, _args: &Args) -> Result<Envelope, ToolError> {
    let response = query(
        client,
        "app.bsky.actor.getPreferences",
        Query::new(),
        "Failed to get notification preferences",
    )
    .await?;
    Ok(Envelope::ok(json!({ "preferences": notification_pref(&response) })))
}
