//! HTTP/1.1 response builder.
//!
//! A response carries either a fully buffered body, written with
//! `Content-Length`, or a [`BodyStream`] written with
//! `Transfer-Encoding: chunked` as the stream yields.

use std::fmt;
use std::pin::Pin;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Serialize;

use super::{Headers, StatusCode};

/// Error produced by a streaming body. Ends the response abruptly.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// A boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BodyError>> + Send>>;

/// Response payload.
pub enum Body {
    Full(Vec<u8>),
    Stream(BodyStream),
}

impl Body {
    /// Drains the body into one buffer.
    ///
    /// Stops at the first stream error, returning it.
    pub async fn collect(self) -> Result<Bytes, BodyError> {
        match self {
            Body::Full(bytes) => Ok(Bytes::from(bytes)),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.put(chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use cloudspark::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Full(Vec::new()),
            keep_alive: true,
        }
    }

    /// Builds a JSON response. Serialization failure degrades to a 500 with a
    /// fixed error body.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                Self::new(StatusCode::InternalServerError)
                    .header("Content-Type", "application/json")
                    .body(r#"{"error":"Internal Server Error"}"#)
            }
        }
    }

    /// Builds a chunked response that forwards `stream` as it yields.
    pub fn stream<S>(status: StatusCode, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Stream(Box::pin(stream)),
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces a header in-place. Used by middleware decorating a downstream response.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Full(body.into().into_bytes());
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Consumes the response, returning its body.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Splits the response into its serialized head and its body.
    ///
    /// The head always carries `Connection`, and either `Content-Length`
    /// (buffered body) or `Transfer-Encoding: chunked` (streamed body).
    /// `Content-Type: text/plain; charset=utf-8` is added when the body may be
    /// non-empty and no type was set.
    pub fn into_parts(mut self) -> (BytesMut, Body) {
        let needs_type = match &self.body {
            Body::Full(bytes) => !bytes.is_empty(),
            Body::Stream(_) => true,
        };
        if needs_type && !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.headers.set("Connection", connection);

        let mut head = BytesMut::with_capacity(128 + self.headers.len() * 64);
        head.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            head.put(format!("{name}: {value}\r\n").as_bytes());
        }
        match &self.body {
            Body::Full(bytes) => head.put(format!("Content-Length: {}\r\n", bytes.len()).as_bytes()),
            Body::Stream(_) => head.put(&b"Transfer-Encoding: chunked\r\n"[..]),
        }
        head.put(&b"\r\n"[..]);

        (head, self.body)
    }

    /// Serializes a buffered response into HTTP/1.1 wire format.
    ///
    /// For a streamed response only the head is returned; send the body with
    /// [`encode_chunk`] and [`LAST_CHUNK`] instead.
    pub fn into_bytes(self) -> BytesMut {
        let (mut head, body) = self.into_parts();
        if let Body::Full(bytes) = body {
            head.put(bytes.as_slice());
        }
        head
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

/// Terminator of a chunked body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Frames one chunk for `Transfer-Encoding: chunked`.
///
/// Empty input yields an empty buffer, since a zero-length chunk would end
/// the body early.
pub fn encode_chunk(data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    if data.is_empty() {
        return buf;
    }
    buf.reserve(data.len() + 12);
    buf.put(format!("{:X}\r\n", data.len()).as_bytes());
    buf.put(data);
    buf.put(&b"\r\n"[..]);
    buf
}
