//! Session management tools.

use serde_json::json;

use super::{Access, Group, ToolDef, ToolId, schema, string_prop};
use crate::envelope::Envelope;
use crate::gate::AuthGate;
use crate::params::Args;
use crate::session::SessionKey;

pub(crate) fn definitions() -> Vec<ToolDef> {
    let g = Group::Authentication;
    vec![
        ToolDef::new(
            ToolId::Login,
            "login",
            g,
            Access::Session,
            "Log in to Bluesky with a handle and app password, replacing any current session",
            schema(
                json!({
                    "handle": string_prop("Bluesky handle or email, e.g. alice.bsky.social"),
                    "password": string_prop("App password"),
                    "service_url": string_prop("PDS URL (default https://bsky.social)"),
                }),
                &["handle", "password"],
            ),
        ),
        ToolDef::new(
            ToolId::Logout,
            "logout",
            g,
            Access::Session,
            "Log out and discard the current session",
            schema(json!({}), &[]),
        ),
        ToolDef::new(
            ToolId::CheckAuthStatus,
            "check_auth_status",
            g,
            Access::Session,
            "Report whether this session is authenticated and as whom",
            schema(json!({}), &[]),
        ),
        ToolDef::new(
            ToolId::CheckEnvironmentVariables,
            "check_environment_variables",
            g,
            Access::Session,
            "Report which credential environment variables are set (values are never shown)",
            schema(json!({}), &[]),
        ),
    ]
}

pub(crate) async fn call(id: ToolId, gate: &AuthGate, key: &SessionKey, args: &Args) -> Envelope {
    match id {
        ToolId::Login => {
            let identifier = args.opt_str("handle").or_else(|| args.opt_str("identifier"));
            let secret = args.opt_str("password").or_else(|| args.opt_str("secret"));
            let endpoint = args.opt_str("service_url").or_else(|| args.opt_str("endpoint"));
            gate.login(key, identifier.as_deref(), secret.as_deref(), endpoint.as_deref())
                .await
        }
        ToolId::Logout => gate.logout(key).await,
        ToolId::CheckAuthStatus => gate.status(key),
        ToolId::CheckEnvironmentVariables => gate.environment(),
        other => Envelope::error(format!("{other:?} is not a session tool")),
    }
}
