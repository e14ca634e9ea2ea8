//! The OpenAI-compatible client against a local fake upstream.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{StreamExt, stream};
use tokio::sync::mpsc;

use cloudspark::http::{BodyError, Request, Response, StatusCode};
use cloudspark::llm::{
    ChatMessage, ChatProvider, CompletionRequest, OpenAiCompatProvider, ProviderError,
    ProviderKind, ProviderSettings,
};
use cloudspark::server::Server;

const KEY: &str = "gsk_test_key";

#[derive(Debug)]
struct Seen {
    path: String,
    authorization: Option<String>,
    body: serde_json::Value,
}

/// Starts an upstream that answers every request with `events`, split into
/// the given network chunks, after recording what it received.
async fn upstream(status: StatusCode, events: &'static [&'static str]) -> (SocketAddr, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = Server::bind("127.0.0.1:0")
        .await
        .unwrap()
        .max_request_duration(Duration::from_secs(5));
    let addr = server.local_addr();
    tokio::spawn(server.run(move |req: Request| {
        let _ = tx.send(Seen {
            path: req.path().to_string(),
            authorization: req.headers().get("authorization").map(str::to_owned),
            body: serde_json::from_slice(req.body()).unwrap_or_default(),
        });
        async move {
            if status != StatusCode::Ok {
                return Response::json(status, &serde_json::json!({ "error": { "message": "nope" } }));
            }
            let body = stream::iter(events.iter().map(|e| Ok::<_, BodyError>(Bytes::from_static(e.as_bytes()))));
            Response::stream(StatusCode::Ok, body).header("Content-Type", "text/event-stream")
        }
    }));
    (addr, rx)
}

fn provider(addr: SocketAddr, key: Option<&str>) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(
        ProviderKind::Groq,
        ProviderSettings::new(format!("http://{addr}/openai/v1"), key.map(str::to_owned)),
    )
    .unwrap()
}

fn completion() -> CompletionRequest {
    CompletionRequest {
        model: "llama-3.3-70b-versatile".into(),
        system: "You are a helpful assistant.".into(),
        messages: vec![ChatMessage::user("Explain quicksort in one sentence")],
    }
}

#[tokio::test]
async fn streams_tokens_and_sends_openai_request() {
    let (addr, mut seen) = upstream(
        StatusCode::Ok,
        &[
            ": connected\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Quick\"}}]}\n\ndata: {\"choices\":",
            "[{\"delta\":{\"content\":\"sort\"}}]}\n\n",
            "data: [DONE]\n\n",
        ],
    )
    .await;

    let tokens: Vec<String> = provider(addr, Some(KEY))
        .stream_chat(completion())
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(tokens, ["Quick", "sort"]);

    let request = seen.recv().await.unwrap();
    assert_eq!(request.path, "/openai/v1/chat/completions");
    assert_eq!(request.authorization.as_deref(), Some("Bearer gsk_test_key"));
    assert_eq!(request.body["model"], "llama-3.3-70b-versatile");
    assert_eq!(request.body["stream"], true);
    assert_eq!(request.body["messages"][0]["role"], "system");
    assert_eq!(request.body["messages"][1]["content"], "Explain quicksort in one sentence");
}

#[tokio::test]
async fn non_success_status_is_http_error() {
    let (addr, _seen) = upstream(StatusCode::Unauthorized, &[]).await;
    match provider(addr, Some(KEY)).stream_chat(completion()).await {
        Err(ProviderError::Http { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("nope"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an HTTP error"),
    }
}

#[tokio::test]
async fn truncated_stream_ends_with_error() {
    let (addr, _seen) = upstream(
        StatusCode::Ok,
        &["data: {\"choices\":[{\"delta\":{\"content\":\"half\"}}]}\n\n"],
    )
    .await;
    let items: Vec<_> = provider(addr, Some(KEY))
        .stream_chat(completion())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "half");
    assert!(matches!(items[1], Err(ProviderError::Stream { .. })));
}

#[tokio::test]
async fn missing_key_sends_nothing() {
    let (addr, mut seen) = upstream(StatusCode::Ok, &["data: [DONE]\n\n"]).await;
    let result = provider(addr, None).stream_chat(completion()).await;
    assert!(matches!(result, Err(ProviderError::MissingCredentials { .. })));
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_upstream_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let result = provider(addr, Some(KEY)).stream_chat(completion()).await;
    assert!(matches!(result, Err(ProviderError::Transport { .. })));
}
