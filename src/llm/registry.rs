//! Provider lookup by catalog tag.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::client::OpenAiCompatProvider;
use super::errors::ProviderError;
use super::{ChatProvider, ProviderKind, ProviderSettings};

/// The set of reachable providers.
///
/// Tags that name no known provider resolve to the fallback
/// ([`ProviderKind::HuggingFace`]) rather than failing, so a catalog row
/// with a typo still gets an answer. Each such fallback is logged.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
    fallback: ProviderKind,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            fallback: ProviderKind::HuggingFace,
        }
    }

    /// Registers `provider` under its own kind, replacing any previous one.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Builds an HTTP client for every known provider.
    ///
    /// Providers without an API key are still registered; they fail with
    /// [`ProviderError::MissingCredentials`] when used.
    pub fn from_settings(
        mut settings: impl FnMut(ProviderKind) -> ProviderSettings,
    ) -> Result<Self, ProviderError> {
        ProviderKind::ALL.into_iter().try_fold(Self::new(), |registry, kind| {
            let client = OpenAiCompatProvider::new(kind, settings(kind))?;
            Ok(registry.with_provider(Arc::new(client)))
        })
    }

    /// Maps a catalog tag to a provider kind, falling back for unknown tags.
    pub fn kind_for_tag(&self, tag: &str) -> ProviderKind {
        ProviderKind::from_tag(tag).unwrap_or_else(|| {
            warn!(tag, fallback = %self.fallback, "unknown provider tag, using fallback");
            self.fallback
        })
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::NotRegistered { provider: kind })
    }

    /// [`kind_for_tag`](Self::kind_for_tag) followed by [`get`](Self::get).
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        self.get(self.kind_for_tag(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, TokenStream};
    use async_trait::async_trait;
    use futures::StreamExt;

    struct Fixed(ProviderKind);

    #[async_trait]
    impl ChatProvider for Fixed {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        async fn stream_chat(&self, _request: CompletionRequest) -> Result<TokenStream, ProviderError> {
            Ok(futures::stream::empty().boxed())
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new()
            .with_provider(Arc::new(Fixed(ProviderKind::Groq)))
            .with_provider(Arc::new(Fixed(ProviderKind::HuggingFace)))
    }

    #[test]
    fn known_tags_resolve_to_their_provider() {
        let registry = registry();
        assert_eq!(registry.resolve("Groq").unwrap().kind(), ProviderKind::Groq);
        assert_eq!(
            registry.resolve("HuggingFace").unwrap().kind(),
            ProviderKind::HuggingFace
        );
    }

    #[test]
    fn unknown_tag_falls_back_to_secondary() {
        assert_eq!(
            registry().resolve("Anthropic").unwrap().kind(),
            ProviderKind::HuggingFace
        );
    }

    #[test]
    fn unregistered_kind_is_an_error() {
        let registry = ProviderRegistry::new().with_provider(Arc::new(Fixed(ProviderKind::Groq)));
        assert!(matches!(
            registry.resolve("hf"),
            Err(ProviderError::NotRegistered {
                provider: ProviderKind::HuggingFace
            })
        ));
    }

    #[test]
    fn from_settings_registers_every_kind() {
        let registry = ProviderRegistry::from_settings(ProviderSettings::defaults_for).unwrap();
        for kind in ProviderKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }
}
