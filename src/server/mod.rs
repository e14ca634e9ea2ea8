//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function. Connections are persistent by default. Streamed response bodies
//! are written with chunked transfer encoding as the body yields, and are
//! dropped as soon as the peer goes away, the body fails, or the request
//! deadline passes. Dropping the body is what cancels upstream work.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, error, info, warn};

use crate::http::response::{LAST_CHUNK, encode_chunk};
use crate::http::{
    Body, StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Default ceiling on the time one request may take, body included.
pub const DEFAULT_MAX_REQUEST_DURATION: Duration = Duration::from_secs(30);

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use cloudspark::server::Server;
/// use cloudspark::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:3000").await?;
///     server.run(|_req: Request| async {
///         Response::new(StatusCode::Ok).body("ok")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_request_duration: Duration,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_request_duration: DEFAULT_MAX_REQUEST_DURATION,
        })
    }

    /// Sets the per-request ceiling.
    ///
    /// A handler that has not returned by then is answered with
    /// `504 Gateway Timeout`; a body still streaming is cut off and the
    /// connection closed.
    #[must_use]
    pub fn max_request_duration(mut self, duration: Duration) -> Self {
        self.max_request_duration = duration;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the process ends or the listener fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        let max_duration = self.max_request_duration;
        info!(address = %self.local_addr, "listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, max_duration).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Why a streamed body stopped before its last chunk.
#[derive(Debug)]
enum Abort {
    Disconnected,
    Upstream(String),
    Deadline,
}

enum Delivery {
    Complete,
    Aborted(Abort),
}

/// Handles a single TCP connection over its lifetime.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    max_duration: Duration,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let (mut reader, mut writer) = stream.split();
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let (request, consumed) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if buf.len() > MAX_REQUEST_SIZE {
                    warn!(peer = %peer_addr, "request too large, sending 413");
                    let response = Response::new(StatusCode::PayloadTooLarge)
                        .body("Request entity too large")
                        .keep_alive(false);
                    writer.write_all(&response.into_bytes()).await?;
                    break;
                }
                if reader.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
                continue;
            }
            Err(e @ RequestError::BodyTooLarge { .. }) => {
                warn!(peer = %peer_addr, error = %e, "declared body too large, sending 413");
                let response = Response::new(StatusCode::PayloadTooLarge)
                    .body("Request entity too large")
                    .keep_alive(false);
                writer.write_all(&response.into_bytes()).await?;
                break;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                writer.write_all(&response.into_bytes()).await?;
                break;
            }
        };
        let _ = buf.split_to(consumed);

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let wants_keep_alive = request.is_keep_alive();
        let deadline = Instant::now() + max_duration;
        let response = match timeout_at(deadline, handler(request)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(peer = %peer_addr, ?max_duration, "handler exceeded request deadline");
                Response::json(
                    StatusCode::GatewayTimeout,
                    &serde_json::json!({ "error": "Request timed out" }),
                )
            }
        };
        let keep_alive = wants_keep_alive && response.is_keep_alive();
        let response = response.keep_alive(keep_alive);

        match write_response(&mut reader, &mut writer, &mut buf, response, deadline).await? {
            Delivery::Complete => {}
            Delivery::Aborted(reason) => {
                match &reason {
                    Abort::Disconnected => debug!(peer = %peer_addr, "peer left mid-stream"),
                    Abort::Upstream(e) => warn!(peer = %peer_addr, error = %e, "body stream failed"),
                    Abort::Deadline => warn!(peer = %peer_addr, "body stream exceeded request deadline"),
                }
                break;
            }
        }

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

/// Writes `response`, streaming its body if it has one.
///
/// While streaming, the read half is polled alongside the body so that a
/// peer closing the socket is noticed before the next chunk arrives. Bytes
/// read meanwhile (a pipelined request) are kept in `buf`.
async fn write_response(
    reader: &mut ReadHalf<'_>,
    writer: &mut WriteHalf<'_>,
    buf: &mut BytesMut,
    response: Response,
    deadline: Instant,
) -> Result<Delivery, std::io::Error> {
    let (head, body) = response.into_parts();
    writer.write_all(&head).await?;

    let mut body = match body {
        Body::Full(bytes) => {
            writer.write_all(&bytes).await?;
            writer.flush().await?;
            return Ok(Delivery::Complete);
        }
        Body::Stream(stream) => stream,
    };
    writer.flush().await?;

    let expired = sleep_until(deadline);
    tokio::pin!(expired);
    let mut watch_peer = true;

    loop {
        tokio::select! {
            read = reader.read_buf(buf), if watch_peer => match read {
                Ok(0) | Err(_) => return Ok(Delivery::Aborted(Abort::Disconnected)),
                Ok(_) => watch_peer = buf.len() <= MAX_REQUEST_SIZE,
            },
            item = body.next() => match item {
                Some(Ok(chunk)) => {
                    let framed = encode_chunk(&chunk);
                    if !framed.is_empty() {
                        writer.write_all(&framed).await?;
                        writer.flush().await?;
                    }
                }
                Some(Err(e)) => return Ok(Delivery::Aborted(Abort::Upstream(e.to_string()))),
                None => {
                    writer.write_all(LAST_CHUNK).await?;
                    writer.flush().await?;
                    return Ok(Delivery::Complete);
                }
            },
            _ = &mut expired => return Ok(Delivery::Aborted(Abort::Deadline)),
        }
    }
}
