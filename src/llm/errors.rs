//! Provider error types.

use thiserror::Error;

use super::ProviderKind;

/// Errors talking to an inference provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key configured; nothing was sent.
    #[error("{provider} API key is not configured (set {env})")]
    MissingCredentials {
        provider: ProviderKind,
        env: &'static str,
    },

    /// The registry has no client for this provider.
    #[error("no client registered for provider {provider}")]
    NotRegistered { provider: ProviderKind },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {reason}")]
    Client { reason: String },

    /// Connection failure or a read error on the response body.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Non-2xx response from the provider.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Malformed or truncated event stream, or an error event from upstream.
    #[error("stream error: {reason}")]
    Stream { reason: String },
}
