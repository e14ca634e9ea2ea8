#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{StreamExt, stream};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use cloudspark::api;
use cloudspark::chat::ChatGateway;
use cloudspark::database::Database;
use cloudspark::llm::{
    ChatProvider, CompletionRequest, ProviderError, ProviderKind, ProviderRegistry, TokenStream,
};
use cloudspark::security::CorsMiddleware;
use cloudspark::server::Server;

// ─── Scripted provider ──────────────────────────────────────────────────────

/// Serves queued replies in order and records every request it receives.
pub struct ScriptedProvider {
    kind: ProviderKind,
    replies: Mutex<VecDeque<Result<TokenStream, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push_tokens(&self, tokens: &[&str]) {
        let items: Vec<Result<String, ProviderError>> =
            tokens.iter().map(|t| Ok(t.to_string())).collect();
        self.push(Ok(stream::iter(items).boxed()));
    }

    /// Tokens followed by a mid-stream failure.
    pub fn push_failing(&self, tokens: &[&str]) {
        let mut items: Vec<Result<String, ProviderError>> =
            tokens.iter().map(|t| Ok(t.to_string())).collect();
        items.push(Err(ProviderError::Transport {
            reason: "connection reset by upstream".into(),
        }));
        self.push(Ok(stream::iter(items).boxed()));
    }

    /// A reply fed by hand; it ends when the sender is dropped.
    pub fn push_channel(&self) -> mpsc::UnboundedSender<Result<String, ProviderError>> {
        let (tx, rx) = mpsc::unbounded();
        self.push(Ok(rx.boxed()));
        tx
    }

    pub fn push(&self, reply: Result<TokenStream, ProviderError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<TokenStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(stream::empty().boxed()))
    }
}

// ─── Application under test ─────────────────────────────────────────────────

pub struct TestApp {
    pub addr: SocketAddr,
    pub db: Database,
    pub groq: Arc<ScriptedProvider>,
    pub hf: Arc<ScriptedProvider>,
    _shutdown: oneshot::Sender<()>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Duration::from_secs(30)).await
    }

    pub async fn spawn_with(max_duration: Duration) -> Self {
        let db = Database::open_in_memory().unwrap();
        let groq = ScriptedProvider::new(ProviderKind::Groq);
        let hf = ScriptedProvider::new(ProviderKind::HuggingFace);
        let registry = ProviderRegistry::new()
            .with_provider(groq.clone())
            .with_provider(hf.clone());

        let gateway = Arc::new(ChatGateway::new(db.clone(), registry));
        let app = Arc::new(api::app(gateway, CorsMiddleware::new().allow_origin("*")));

        let server = Server::bind("127.0.0.1:0")
            .await
            .unwrap()
            .max_request_duration(max_duration);
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(
            move |request| {
                let app = Arc::clone(&app);
                async move { app.handle(request).await }
            },
            async {
                let _ = rx.await;
            },
        ));

        Self {
            addr,
            db,
            groq,
            hf,
            _shutdown: tx,
        }
    }

    pub async fn send(&self, method: &str, path: &str, body: Option<&str>) -> RawResponse {
        send_raw(self.addr, &request(method, path, body, &[])).await
    }

    /// Waits for the conversation to hold `expected` messages.
    pub async fn wait_for_messages(&self, conversation_id: &str, expected: usize) -> bool {
        for _ in 0..100 {
            if self.db.message_count(conversation_id).await.unwrap() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    pub async fn chat(&self, body: &str) -> RawResponse {
        self.send("POST", "/chat", Some(body)).await
    }
}

// ─── Raw HTTP client ────────────────────────────────────────────────────────

/// Builds a `Connection: close` request.
pub fn request(method: &str, path: &str, body: Option<&str>, extra: &[(&str, &str)]) -> String {
    let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    for (name, value) in extra {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = body {
        raw.push_str("Content-Type: application/json\r\n");
        raw.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    } else {
        raw.push_str("\r\n");
    }
    raw
}

/// Sends `raw` and reads until the server closes the connection.
pub async fn send_raw(addr: SocketAddr, raw: &str) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut bytes = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut bytes))
        .await
        .expect("server did not close the connection")
        .unwrap();
    RawResponse::parse(&bytes)
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub chunked: bool,
    /// For chunked bodies: whether the terminating zero-length chunk arrived.
    pub complete: bool,
}

impl RawResponse {
    pub fn parse(bytes: &[u8]) -> Self {
        let split = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response head");
        let head = std::str::from_utf8(&bytes[..split]).unwrap();
        let rest = &bytes[split + 4..];

        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap();
        let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let chunked = headers
            .iter()
            .any(|(n, v)| n == "transfer-encoding" && v.eq_ignore_ascii_case("chunked"));

        let (body, complete) = if chunked {
            decode_chunked(rest)
        } else {
            (rest.to_vec(), true)
        };

        Self {
            status,
            headers,
            body,
            chunked,
            complete,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Decodes as many chunks as are present; reports whether the last chunk
/// was seen.
pub fn decode_chunked(mut data: &[u8]) -> (Vec<u8>, bool) {
    let mut body = Vec::new();
    loop {
        let Some(line_end) = data.windows(2).position(|w| w == b"\r\n") else {
            return (body, false);
        };
        let size_text = std::str::from_utf8(&data[..line_end]).unwrap();
        let size = usize::from_str_radix(size_text.trim(), 16).unwrap();
        data = &data[line_end + 2..];
        if size == 0 {
            return (body, true);
        }
        if data.len() < size + 2 {
            return (body, false);
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

/// Polls `check` until it returns true or two seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
