//! Server-sent events parser for OpenAI-compatible chat completions.
//!
//! Splits the response body into SSE events (`data: …\n\n`), decodes each
//! payload as a completion chunk and yields the text deltas. The stream is
//! complete only once `data: [DONE]` arrives; a body that ends before that is
//! reported as an error so that a truncated answer is never mistaken for a
//! finished one.

use std::fmt;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use super::errors::ProviderError;
use super::types::CompletionChunk;

const DONE: &str = "[DONE]";

/// Longest single event we buffer before giving up on the upstream.
const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Turns a raw SSE byte stream into ordered text deltas.
pub fn parse_sse_stream<S, E>(body: S) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display,
{
    let body = body.map(|chunk| chunk.map_err(|e| e.to_string())).boxed();

    stream::unfold(SseState::new(body), |mut state| async move {
        let item = state.next_token().await?;
        Some((item, state))
    })
}

// ─── Stream state ───────────────────────────────────────────────────────────

struct SseState {
    body: BoxStream<'static, Result<Bytes, String>>,
    /// Bytes not yet forming a complete event. Kept as bytes so a multi-byte
    /// character split across reads is decoded whole.
    buffer: Vec<u8>,
    eof: bool,
    finished: bool,
}

enum Event {
    Token(String),
    Skip,
    Done,
}

impl SseState {
    fn new(body: BoxStream<'static, Result<Bytes, String>>) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            eof: false,
            finished: false,
        }
    }

    /// `None` ends the stream. After `[DONE]` or an error the body is never
    /// polled again.
    async fn next_token(&mut self) -> Option<Result<String, ProviderError>> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(raw) = self.take_event() {
                match process_event(&raw) {
                    Ok(Event::Token(text)) => return Some(Ok(text)),
                    Ok(Event::Skip) => continue,
                    Ok(Event::Done) => {
                        self.finished = true;
                        return None;
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            if self.buffer.len() > MAX_EVENT_SIZE {
                self.finished = true;
                return Some(Err(ProviderError::Stream {
                    reason: format!("event exceeds {MAX_EVENT_SIZE} bytes"),
                }));
            }

            if self.eof {
                self.finished = true;
                return Some(Err(ProviderError::Stream {
                    reason: "event stream ended before [DONE]".into(),
                }));
            }

            match self.body.next().await {
                Some(Ok(bytes)) => self.buffer.extend(bytes.iter().filter(|b| **b != b'\r')),
                Some(Err(reason)) => {
                    self.finished = true;
                    return Some(Err(ProviderError::Transport { reason }));
                }
                None => {
                    self.eof = true;
                    // Flush a trailing event that lacks its blank line.
                    if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                        self.buffer.extend_from_slice(b"\n\n");
                    }
                }
            }
        }
    }

    fn take_event(&mut self) -> Option<String> {
        let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
        Some(String::from_utf8_lossy(&event[..end]).into_owned())
    }
}

/// Handles one event, which may carry several `data:` lines.
fn process_event(event: &str) -> Result<Event, ProviderError> {
    let mut data = String::new();
    for line in event.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    let data = data.trim();
    if data.is_empty() {
        return Ok(Event::Skip);
    }
    if data == DONE {
        return Ok(Event::Done);
    }

    let chunk: CompletionChunk = serde_json::from_str(data).map_err(|e| ProviderError::Stream {
        reason: format!("malformed chunk: {e}"),
    })?;

    if let Some(error) = chunk.error {
        let reason = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string());
        return Err(ProviderError::Stream { reason });
    }

    let text: String = chunk
        .choices
        .into_iter()
        .take(1)
        .filter_map(|choice| choice.delta.content)
        .collect();

    if text.is_empty() {
        Ok(Event::Skip)
    } else {
        Ok(Event::Token(text))
    }
}
