//! Full connection round trips through `McpServer::serve_connection`.

use std::sync::Arc;
use std::time::Duration;

use bsky_mcp::config::AuthPolicy;
use bsky_mcp::credentials::MapEnv;
use bsky_mcp::framing::{Framing, MessageReader, encode_content_length};
use bsky_mcp::testing::MockClientFactory;
use bsky_mcp::{AuthGate, McpServer, SessionKey};
use serde_json::{Value, json};

fn server(factory: Arc<MockClientFactory>) -> McpServer {
    let gate = AuthGate::new(factory, Arc::new(MapEnv::new()), AuthPolicy::Lazy);
    McpServer::new(Arc::new(gate), Duration::from_secs(5))
}

fn request(id: u64, method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string()
}

fn newline_stream(messages: &[String]) -> Vec<u8> {
    messages.iter().flat_map(|m| format!("{m}\n").into_bytes()).collect()
}

async fn read_all(output: &[u8]) -> Vec<(Framing, Value)> {
    let mut reader = MessageReader::new(output);
    let mut frames = Vec::new();
    while let Some(frame) = reader.next_message().await.unwrap() {
        frames.push((frame.framing, serde_json::from_str(&frame.body).unwrap()));
    }
    frames
}

#[tokio::test]
async fn newline_session_logs_in_and_calls_protected_tool() {
    let factory = Arc::new(MockClientFactory::new());
    factory.respond("app.bsky.actor.getProfile", json!({ "handle": "alice.test" }));
    let server = server(factory.clone());
    let key = SessionKey::generate();

    let input = newline_stream(&[
        request(1, "initialize", json!({ "protocolVersion": "2025-03-26" })),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
        request(2, "tools/call", json!({
            "name": "login",
            "arguments": { "handle": "alice.test", "password": "app-pw" },
        })),
        request(3, "tools/call", json!({ "name": "get_profile", "arguments": {} })),
    ]);
    let mut output = Vec::new();
    server.serve_connection(key.clone(), &input[..], &mut output).await.unwrap();

    let frames = read_all(&output).await;
    assert_eq!(frames.len(), 3, "notifications get no reply");
    assert!(frames.iter().all(|(f, _)| *f == Framing::Newline));

    let init = &frames[0].1;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");

    let login = &frames[1].1["result"];
    assert_eq!(login["isError"], false);
    assert_eq!(login["structuredContent"]["did"], "did:plc:alice.test");

    let profile = &frames[2].1["result"];
    assert_eq!(profile["isError"], false);
    assert_eq!(profile["structuredContent"]["profile"]["handle"], "alice.test");
    let text = profile["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("\"status\": \"success\""));

    assert_eq!(factory.login_count(), 1);
    // EOF ends the session and closes its handle.
    assert!(factory.last_client().unwrap().is_closed());
    assert!(!server.gate().registry().is_authenticated(&key));
}

#[tokio::test]
async fn content_length_requests_get_content_length_replies() {
    let server = server(Arc::new(MockClientFactory::new()));
    let mut input = encode_content_length(&request(1, "ping", json!({})));
    input.extend(encode_content_length(&request(2, "tools/list", json!({}))));
    let mut output = Vec::new();
    server
        .serve_connection(SessionKey::generate(), &input[..], &mut output)
        .await
        .unwrap();

    let frames = read_all(&output).await;
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|(f, _)| *f == Framing::ContentLength));
    assert_eq!(frames[0].1["result"], json!({}));
    let tools = frames[1].1["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "login"));
    assert!(tools.iter().any(|t| t["name"] == "get_timeline_posts"));
}

#[tokio::test]
async fn protected_tool_without_credentials_reports_error_result() {
    let factory = Arc::new(MockClientFactory::new());
    let server = server(factory.clone());
    let input = newline_stream(&[request(7, "tools/call", json!({ "name": "get_notifications" }))]);
    let mut output = Vec::new();
    server
        .serve_connection(SessionKey::generate(), &input[..], &mut output)
        .await
        .unwrap();

    let frames = read_all(&output).await;
    let result = &frames[0].1["result"];
    assert_eq!(frames[0].1["id"], 7);
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["error_kind"], "missing_credentials");
    assert_eq!(factory.login_count(), 0);
}

#[tokio::test]
async fn malformed_input_is_answered_and_connection_continues() {
    let server = server(Arc::new(MockClientFactory::new()));
    let input = newline_stream(&[
        "{not json".to_string(),
        request(2, "tools/call", json!({ "name": "no_such_tool" })),
        request(3, "bogus/method", json!({})),
        request(4, "resources/read", json!({ "uri": "info://bluesky-tools" })),
    ]);
    let mut output = Vec::new();
    server
        .serve_connection(SessionKey::generate(), &input[..], &mut output)
        .await
        .unwrap();

    let frames = read_all(&output).await;
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0].1["error"]["code"], -32700);
    assert_eq!(frames[0].1["id"], Value::Null);
    assert_eq!(frames[1].1["error"]["code"], -32602);
    assert_eq!(frames[2].1["error"]["code"], -32601);
    let contents = &frames[3].1["result"]["contents"][0];
    assert_eq!(contents["mimeType"], "text/markdown");
    assert!(contents["text"].as_str().unwrap().contains("get_profile"));
}

#[tokio::test]
async fn concurrent_connections_do_not_share_sessions() {
    let factory = Arc::new(MockClientFactory::new());
    let server = Arc::new(server(factory.clone()));
    let a = SessionKey::generate();
    let b = SessionKey::generate();

    let (client_a, server_a) = tokio::io::duplex(4096);
    let (read_a, write_a) = tokio::io::split(server_a);
    let task = {
        let server = server.clone();
        let a = a.clone();
        tokio::spawn(async move { server.serve_connection(a, read_a, write_a).await })
    };

    let (mut reader_a, mut writer_a) = tokio::io::split(client_a);
    let login = request(1, "tools/call", json!({
        "name": "login",
        "arguments": { "handle": "alice.test", "password": "pw" },
    }));
    tokio::io::AsyncWriteExt::write_all(&mut writer_a, format!("{login}\n").as_bytes())
        .await
        .unwrap();
    let mut replies = MessageReader::new(&mut reader_a);
    let reply = replies.next_message().await.unwrap().unwrap();
    assert!(reply.body.contains("Logged in as @alice.test"));
    assert!(server.gate().registry().is_authenticated(&a));

    let status = newline_stream(&[request(1, "tools/call", json!({ "name": "check_auth_status" }))]);
    let mut output = Vec::new();
    server.serve_connection(b.clone(), &status[..], &mut output).await.unwrap();
    let frames = read_all(&output).await;
    assert_eq!(frames[0].1["result"]["structuredContent"]["authenticated"], false);
    assert!(server.gate().registry().is_authenticated(&a));

    drop(writer_a);
    drop(replies);
    drop(reader_a);
    task.await.unwrap().unwrap();
    assert!(!server.gate().registry().is_authenticated(&a));
    assert!(factory.last_client().unwrap().is_closed());
}

#[tokio::test]
async fn oversized_frame_body_is_discarded_not_executed() {
    let server = server(Arc::new(MockClientFactory::new()));
    let mut input = b"Content-Length: 99999999\r\n\r\n".to_vec();
    input.extend(request(99, "ping", json!({})).into_bytes());
    input.push(b'\n');
    let mut output = Vec::new();
    server
        .serve_connection(SessionKey::generate(), &input[..], &mut output)
        .await
        .unwrap();

    let frames = read_all(&output).await;
    assert_eq!(frames.len(), 1, "{frames:?}");
    assert_eq!(frames[0].1["error"]["code"], -32700);
    assert!(frames.iter().all(|(_, v)| v["id"] != 99));
}

#[tokio::test]
async fn connection_continues_after_oversized_frame() {
    let server = server(Arc::new(MockClientFactory::new()));
    let mut input = format!("Content-Length: {}\r\n\r\n", bsky_mcp::framing::MAX_FRAME_BYTES + 1).into_bytes();
    input.extend(std::iter::repeat_n(b' ', bsky_mcp::framing::MAX_FRAME_BYTES + 1));
    input.extend(newline_stream(&[request(2, "ping", json!({}))]));
    let mut output = Vec::new();
    server
        .serve_connection(SessionKey::generate(), &input[..], &mut output)
        .await
        .unwrap();

    let frames = read_all(&output).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].1["error"]["code"], -32700);
    assert_eq!(frames[1].1["id"], 2);
    assert_eq!(frames[1].1["result"], json!({}));
}

#[tokio::test]
async fn unparseable_content_length_closes_connection() {
    let server = server(Arc::new(MockClientFactory::new()));
    let input = format!("Content-Length: lots\r\n\r\n{}\n", request(3, "ping", json!({})));
    let mut output = Vec::new();
    let outcome = server
        .serve_connection(SessionKey::generate(), input.as_bytes(), &mut output)
        .await;
    assert!(outcome.is_err());

    let frames = read_all(&output).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].1["error"]["code"], -32700);
}

#[tokio::test]
async fn trends_and_notification_preferences_through_server() {
    let factory = Arc::new(MockClientFactory::new());
    factory.respond(
        "app.bsky.feed.getFeed",
        json!({ "feed": [
            { "post": { "record": { "text": "#Rust #rust #tokio" } } },
        ]}),
    );
    factory.respond("app.bsky.actor.getPreferences", json!({ "preferences": [] }));
    let server = server(factory.clone());

    let input = newline_stream(&[
        request(1, "tools/call", json!({
            "name": "login",
            "arguments": { "handle": "alice.test", "password": "pw" },
        })),
        request(2, "tools/call", json!({ "name": "get_trends" })),
        request(3, "tools/call", json!({ "name": "get_notification_preferences" })),
    ]);
    let mut output = Vec::new();
    server
        .serve_connection(SessionKey::generate(), &input[..], &mut output)
        .await
        .unwrap();

    let frames = read_all(&output).await;
    let trends = &frames[1].1["result"]["structuredContent"]["trends"];
    assert_eq!(trends, &json!([{ "tag": "rust", "count": 2 }, { "tag": "tokio", "count": 1 }]));
    let prefs = &frames[2].1["result"]["structuredContent"]["preferences"];
    assert_eq!(prefs, &json!({ "enabled": true }));

    let client = factory.last_client().unwrap();
    assert_eq!(client.calls_to("app.bsky.feed.getFeed").len(), 1);
    assert_eq!(client.calls_to("app.bsky.actor.getPreferences").len(), 1);
}
