//! HTTP client for OpenAI-compatible chat-completion endpoints.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use tracing::debug;

use super::errors::ProviderError;
use super::streaming::parse_sse_stream;
use super::types::{CompletionRequest, WireRequest};
use super::{ChatProvider, ProviderKind, ProviderSettings, TokenStream};

/// TCP connection timeout. The overall duration is bounded by the server's
/// request deadline, which drops the stream.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streams completions from `{base_url}/chat/completions`.
pub struct OpenAiCompatProvider {
    kind: ProviderKind,
    settings: ProviderSettings,
    http: HttpClient,
}

impl OpenAiCompatProvider {
    pub fn new(kind: ProviderKind, settings: ProviderSettings) -> Result<Self, ProviderError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Client {
                reason: e.to_string(),
            })?;

        Ok(Self {
            kind,
            settings,
            http,
        })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<TokenStream, ProviderError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials {
                provider: self.kind,
                env: self.kind.api_key_env(),
            })?;

        let url = self.endpoint();
        let body = WireRequest::from_completion(&request);
        debug!(
            provider = %self.kind,
            model = %request.model,
            message_count = body.messages.len(),
            %url,
            "starting completion"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(parse_sse_stream(response.bytes_stream()).boxed())
    }
}
