//! Deferred continuations: work that runs after a response has been handed
//! to the client.
//!
//! [`deferred`] creates a linked pair. The [`Trigger`] travels with whatever
//! produces the value (typically a response body stream); the [`Deferred`]
//! is awaited by a spawned task. Firing the trigger wakes the task with the
//! value. Dropping the trigger unfired, for instance because the client
//! disconnected and the body stream was dropped, resolves the `Deferred` to
//! `None`, so the continuation can exit without doing anything.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Creates a connected [`Trigger`] / [`Deferred`] pair.
pub fn deferred<T>() -> (Trigger<T>, Deferred<T>) {
    let (tx, rx) = oneshot::channel();
    (Trigger { tx }, Deferred { rx })
}

/// Sending half. Consumed by [`fire`](Self::fire).
#[derive(Debug)]
pub struct Trigger<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Trigger<T> {
    /// Releases the continuation with `value`.
    ///
    /// Returns `false` if the [`Deferred`] has already been dropped.
    pub fn fire(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

/// Resolves to `Some(value)` when the trigger fires, or `None` when the
/// trigger is dropped without firing.
#[derive(Debug)]
pub struct Deferred<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Deferred<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}
