//! Chat message types shared by the gateway and the provider wire format.

use serde::{Deserialize, Serialize};

/// Message role as understood by chat-completion APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A provider-agnostic streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Provider-specific model string, e.g. `llama-3.3-70b-versatile`.
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

// ─── OpenAI-compatible wire format ──────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct WireRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

impl<'a> WireRequest<'a> {
    /// The system prompt goes first, followed by the history as given.
    pub fn from_completion(request: &'a CompletionRequest) -> Self {
        let system = (!request.system.is_empty()).then(|| WireMessage {
            role: Role::System,
            content: &request.system,
        });
        let messages = system
            .into_iter()
            .chain(request.messages.iter().map(|m| WireMessage {
                role: m.role,
                content: &m.content,
            }))
            .collect();
        Self {
            model: &request.model,
            messages,
            stream: true,
        }
    }
}

/// One `data:` payload of a streamed completion.
#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}
