//! Token stream wrapper that reports the full text on natural completion.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use crate::background::Trigger;
use crate::llm::{ProviderError, TokenStream};

/// Forwards provider tokens while accumulating them.
///
/// When the provider stream ends normally the trigger fires with the whole
/// text. An error, or dropping this stream before the end, drops the trigger
/// unfired. Nothing is yielded after an error.
pub struct CompletionStream {
    inner: TokenStream,
    text: String,
    trigger: Option<Trigger<String>>,
}

impl CompletionStream {
    pub fn new(inner: TokenStream, trigger: Trigger<String>) -> Self {
        Self {
            inner,
            text: String::new(),
            trigger: Some(trigger),
        }
    }
}

impl Stream for CompletionStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.trigger.is_none() {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(token))) => {
                this.text.push_str(&token);
                Poll::Ready(Some(Ok(token)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.trigger = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(trigger) = this.trigger.take() {
                    trigger.fire(std::mem::take(&mut this.text));
                }
                Poll::Ready(None)
            }
        }
    }
}
