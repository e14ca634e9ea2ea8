//! LLM integration: hosted provider clients and prompt tables.
//!
//! Every provider is reached through [`ChatProvider`], which turns a
//! [`CompletionRequest`] into a [`TokenStream`]. Both hosted services we
//! talk to speak the OpenAI chat-completions dialect, so one client type,
//! [`OpenAiCompatProvider`], serves both and differs only in its
//! [`ProviderSettings`].
//!
//! Dropping a [`TokenStream`] drops the underlying HTTP response, which
//! aborts the upstream generation.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

mod client;
mod errors;
pub mod prompts;
mod registry;
mod streaming;
mod types;

pub use client::OpenAiCompatProvider;
pub use errors::ProviderError;
pub use prompts::Domain;
pub use registry::ProviderRegistry;
pub use streaming::parse_sse_stream;
pub use types::{ChatMessage, CompletionRequest, Role};

/// Ordered text deltas from a provider.
pub type TokenStream = BoxStream<'static, Result<String, ProviderError>>;

/// A hosted inference service with a streaming chat API.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Starts a streaming completion.
    ///
    /// Errors returned here happen before any token is produced; errors
    /// inside the stream happen mid-generation.
    async fn stream_chat(&self, request: CompletionRequest) -> Result<TokenStream, ProviderError>;
}

/// The providers this gateway knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Primary provider.
    Groq,
    /// Secondary provider, also the target for unrecognised tags.
    HuggingFace,
}

struct ProviderEntry {
    kind: ProviderKind,
    tag: &'static str,
    aliases: &'static [&'static str],
    base_url: &'static str,
    key_env: &'static str,
}

static PROVIDERS: [ProviderEntry; 2] = [
    ProviderEntry {
        kind: ProviderKind::Groq,
        tag: "Groq",
        aliases: &["groq", "primary"],
        base_url: "https://api.groq.com/openai/v1",
        key_env: "GROQ_API_KEY",
    },
    ProviderEntry {
        kind: ProviderKind::HuggingFace,
        tag: "HuggingFace",
        aliases: &["huggingface", "hugging_face", "hf", "secondary"],
        base_url: "https://router.huggingface.co/v1",
        key_env: "HUGGINGFACE_API_KEY",
    },
];

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Groq, ProviderKind::HuggingFace];

    fn entry(self) -> &'static ProviderEntry {
        match self {
            ProviderKind::Groq => &PROVIDERS[0],
            ProviderKind::HuggingFace => &PROVIDERS[1],
        }
    }

    /// Parses a catalog or request tag, ignoring ASCII case.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        PROVIDERS
            .iter()
            .find(|entry| {
                entry.tag.eq_ignore_ascii_case(tag)
                    || entry.aliases.iter().any(|a| a.eq_ignore_ascii_case(tag))
            })
            .map(|entry| entry.kind)
    }

    /// The tag stored in the catalog's `provider` column.
    pub fn as_str(self) -> &'static str {
        self.entry().tag
    }

    pub fn default_base_url(self) -> &'static str {
        self.entry().base_url
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(self) -> &'static str {
        self.entry().key_env
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn defaults_for(kind: ProviderKind) -> Self {
        Self::new(kind.default_base_url(), None)
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
