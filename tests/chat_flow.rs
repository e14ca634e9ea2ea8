//! End-to-end chat behaviour over a real socket.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cloudspark::database::{MessageRole, ModelInfo};
use cloudspark::llm::{ProviderError, ProviderKind};
use cloudspark::security::GUEST_USER_ID;
use common::{TestApp, request, wait_until};

fn chat_body(text: &str) -> String {
    json!({ "messages": [{ "role": "user", "content": text }] }).to_string()
}

#[tokio::test]
async fn quicksort_round_trip() {
    let app = TestApp::spawn().await;
    app.groq
        .push_tokens(&["Quicksort ", "partitions around a pivot", " and recurses."]);

    let res = app.chat(&chat_body("Explain quicksort in one sentence")).await;
    assert_eq!(res.status, 200);
    assert!(res.chunked);
    assert!(res.complete);
    assert_eq!(
        res.text(),
        "Quicksort partitions around a pivot and recurses."
    );
    assert!(res.header("content-type").unwrap().starts_with("text/plain"));
    let conversation_id = res.header("x-conversation-id").unwrap().to_string();

    let path = format!("/conversations/{conversation_id}");
    assert!(app.wait_for_messages(&conversation_id, 2).await);

    let detail = app.send("GET", &path, None).await.json();
    assert_eq!(detail["title"], "Explain quicksort in one sentence");
    assert_eq!(detail["userId"], GUEST_USER_ID);
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "Explain quicksort in one sentence");
    assert_eq!(messages[0]["modelUsed"], "llama-3.3-70b-versatile");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(
        messages[1]["content"],
        "Quicksort partitions around a pivot and recurses."
    );

    let listed = app.send("GET", "/conversations", None).await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], conversation_id.as_str());
}

#[tokio::test]
async fn follow_up_turn_reuses_conversation() {
    let app = TestApp::spawn().await;
    app.groq.push_tokens(&["first reply"]);
    app.groq.push_tokens(&["second reply"]);

    let first = app.chat(&chat_body("first")).await;
    let id = first.header("x-conversation-id").unwrap().to_string();
    assert!(app.wait_for_messages(&id, 2).await);

    let body = json!({
        "messages": [
            { "role": "user", "content": "first" },
            { "role": "assistant", "content": "first reply" },
            { "role": "user", "content": "second" }
        ],
        "conversationId": id,
    });
    let second = app.chat(&body.to_string()).await;
    assert_eq!(second.header("x-conversation-id"), Some(id.as_str()));
    assert!(app.wait_for_messages(&id, 4).await);

    // The full history reaches the provider.
    let sent = app.groq.requests();
    assert_eq!(sent[1].messages.len(), 3);
}

#[tokio::test]
async fn delete_of_unknown_conversation_is_404() {
    let app = TestApp::spawn().await;
    app.groq.push_tokens(&["kept"]);
    let res = app.chat(&chat_body("keep me")).await;
    let kept = res.header("x-conversation-id").unwrap().to_string();

    let missing = app.send("DELETE", "/conversations/does-not-exist", None).await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.json(), json!({ "error": "Conversation not found" }));
    assert_eq!(
        app.db.list_conversations(GUEST_USER_ID).await.unwrap().len(),
        1
    );

    let deleted = app
        .send("DELETE", &format!("/conversations/{kept}"), None)
        .await;
    assert_eq!(deleted.status, 200);
    assert_eq!(deleted.json(), json!({ "success": true }));

    let gone = app.send("GET", &format!("/conversations/{kept}"), None).await;
    assert_eq!(gone.status, 404);
    assert_eq!(app.db.message_count(&kept).await.unwrap(), 0);
}

#[tokio::test]
async fn client_disconnect_stores_no_reply() {
    let app = TestApp::spawn().await;
    let tokens = app.groq.push_channel();

    let mut socket = TcpStream::connect(app.addr).await.unwrap();
    socket
        .write_all(request("POST", "/chat", Some(&chat_body("stream slowly")), &[]).as_bytes())
        .await
        .unwrap();

    tokens.unbounded_send(Ok("partial".to_string())).unwrap();
    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    while !String::from_utf8_lossy(&seen).contains("partial") {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "server closed before first token");
        seen.extend_from_slice(&buf[..n]);
    }
    drop(socket);

    // The server drops the body once it notices, which closes our channel.
    assert!(wait_until(|| tokens.is_closed()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let conversations = app.db.list_conversations(GUEST_USER_ID).await.unwrap();
    assert_eq!(conversations.len(), 1);
    let detail = app
        .db
        .conversation_with_messages(&conversations[0].id, GUEST_USER_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn upstream_failure_mid_stream_truncates_response() {
    let app = TestApp::spawn().await;
    app.groq.push_failing(&["half an ans"]);

    let res = app.chat(&chat_body("hello")).await;
    assert_eq!(res.status, 200);
    assert!(res.chunked);
    assert!(!res.complete, "truncated body must not carry the last chunk");
    assert_eq!(res.text(), "half an ans");

    let id = res.header("x-conversation-id").unwrap().to_string();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(app.db.message_count(&id).await.unwrap(), 1);
}

#[tokio::test]
async fn provider_refusal_is_502_and_keeps_user_turn() {
    let app = TestApp::spawn().await;
    app.groq.push(Err(ProviderError::Http {
        status: 429,
        body: "rate limited".into(),
    }));

    let res = app.chat(&chat_body("hello")).await;
    assert_eq!(res.status, 502);
    assert!(res.json()["error"].as_str().unwrap().contains("429"));

    let conversations = app.db.list_conversations(GUEST_USER_ID).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(app.db.message_count(&conversations[0].id).await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_chat_requests_are_400() {
    let app = TestApp::spawn().await;

    let empty = app.chat(r#"{"messages":[]}"#).await;
    assert_eq!(empty.status, 400);

    let trailing_assistant = json!({
        "messages": [
            { "role": "user", "content": "hi" },
            { "role": "assistant", "content": "hello" }
        ]
    });
    assert_eq!(app.chat(&trailing_assistant.to_string()).await.status, 400);

    let malformed = app.chat("{not json").await;
    assert_eq!(malformed.status, 400);
    assert!(malformed.json()["error"].is_string());

    assert!(app.db.list_conversations(GUEST_USER_ID).await.unwrap().is_empty());
    assert!(app.groq.requests().is_empty());
}

#[tokio::test]
async fn catalog_model_routes_to_its_provider() {
    let app = TestApp::spawn().await;
    app.db.seed_catalog().await.unwrap();
    app.hf.push_tokens(&["hi from hf"]);

    let body = json!({
        "messages": [{ "role": "user", "content": "hello" }],
        "modelId": "meta-llama/Meta-Llama-3-8B-Instruct",
        "domain": "Finance"
    });
    let res = app.chat(&body.to_string()).await;
    assert_eq!(res.text(), "hi from hf");

    let sent = app.hf.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].model, "meta-llama/Meta-Llama-3-8B-Instruct");
    assert!(sent[0].system.contains("quantitative analyst"));
    assert!(app.groq.requests().is_empty());
}

#[tokio::test]
async fn unknown_catalog_provider_falls_back_to_secondary() {
    let app = TestApp::spawn().await;
    app.db
        .upsert_model(ModelInfo::new("some-model", "Mystery"))
        .await
        .unwrap();
    app.hf.push_tokens(&["fallback"]);

    let res = app.chat(&chat_body("hello")).await;
    assert_eq!(res.text(), "fallback");
    assert_eq!(app.hf.requests()[0].model, "some-model");
}

#[tokio::test]
async fn models_lists_enabled_entries_in_order() {
    let app = TestApp::spawn().await;
    app.db.seed_catalog().await.unwrap();
    let mut disabled = ModelInfo::new("mixtral-8x7b-32768", "Groq");
    disabled.is_enabled = false;
    app.db.upsert_model(disabled).await.unwrap();

    let res = app.send("GET", "/models", None).await;
    assert_eq!(res.status, 200);
    let models = res.json();
    let ids: Vec<&str> = models
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        [
            "llama-3.3-70b-versatile",
            "meta-llama/Meta-Llama-3-8B-Instruct",
            "microsoft/Phi-3-mini-4k-instruct"
        ]
    );
    assert_eq!(models[0]["provider"], "Groq");
    assert_eq!(models[0]["isEnabled"], true);
}

#[tokio::test]
async fn generate_streams_without_persisting() {
    let app = TestApp::spawn().await;
    app.groq.push_tokens(&["Role: ", "Senior Mobile App Developer"]);

    let body = json!({ "prompt": "build a transit app", "provider": "groq" });
    let res = app.send("POST", "/generate", Some(&body.to_string())).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "Role: Senior Mobile App Developer");

    let sent = app.groq.requests();
    assert_eq!(sent[0].model, "llama-3.3-70b-versatile");
    assert!(sent[0].system.starts_with("You are an elite AI Prompt Engineer."));
    assert!(app.db.list_conversations(GUEST_USER_ID).await.unwrap().is_empty());

    let hf_body = json!({ "prompt": "a recipe app" });
    app.send("POST", "/generate", Some(&hf_body.to_string())).await;
    assert_eq!(
        app.hf.requests()[0].model,
        "meta-llama/Meta-Llama-3-8B-Instruct"
    );
}

#[tokio::test]
async fn unknown_route_and_preflight() {
    let app = TestApp::spawn().await;

    let missing = app.send("GET", "/nope", None).await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.json(), json!({ "error": "Not Found" }));

    let preflight = common::send_raw(
        app.addr,
        &request(
            "OPTIONS",
            "/chat",
            None,
            &[
                ("Origin", "http://localhost:5173"),
                ("Access-Control-Request-Method", "POST"),
            ],
        ),
    )
    .await;
    assert_eq!(preflight.status, 204);
    assert_eq!(preflight.header("access-control-allow-origin"), Some("*"));
}

#[tokio::test]
async fn browser_can_read_conversation_header() {
    let app = TestApp::spawn().await;
    app.groq.push_tokens(&["ok"]);
    let res = common::send_raw(
        app.addr,
        &request(
            "POST",
            "/chat",
            Some(&chat_body("hi")),
            &[("Origin", "http://localhost:5173")],
        ),
    )
    .await;
    assert_eq!(
        res.header("access-control-expose-headers"),
        Some("x-conversation-id")
    );
    assert!(res.header("x-conversation-id").is_some());
}

#[tokio::test]
async fn missing_credentials_surface_as_502() {
    let app = TestApp::spawn().await;
    app.groq.push(Err(ProviderError::MissingCredentials {
        provider: ProviderKind::Groq,
        env: "GROQ_API_KEY",
    }));
    let res = app.chat(&chat_body("hello")).await;
    assert_eq!(res.status, 502);
    assert!(res.json()["error"].as_str().unwrap().contains("GROQ_API_KEY"));
}

#[tokio::test]
async fn unknown_conversation_id_is_500_without_rows() {
    let app = TestApp::spawn().await;
    app.groq.push_tokens(&["never sent"]);

    let body = json!({
        "messages": [{ "role": "user", "content": "hello" }],
        "conversationId": "no-such-conversation",
    });
    let res = app.chat(&body.to_string()).await;
    assert_eq!(res.status, 500);
    assert!(!res.chunked);
    assert_eq!(res.json(), json!({ "error": "Failed to process chat" }));
    assert!(res.header("x-conversation-id").is_none());

    assert!(app.groq.requests().is_empty());
    assert_eq!(app.db.message_count("no-such-conversation").await.unwrap(), 0);
    let listed = app.send("GET", "/conversations", None).await.json();
    assert!(listed.as_array().unwrap().is_empty());
}
