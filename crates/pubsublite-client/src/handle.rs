//! Publish futures.
//!
//! `publish()` never blocks: it hands the message to a background worker and
//! returns a `PublishHandle`, the receiving half of a oneshot channel. The
//! worker resolves the sending half once the server acknowledges the batch,
//! the partition fails, or the publisher shuts down. A sender dropped without
//! resolving (worker gone) reads as `PublishError::Shutdown`, so a handle can
//! never hang on a dead publisher.

use crate::error::PublishError;
use pubsublite_core::MessageMetadata;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub(crate) type ResultSender<T> = oneshot::Sender<Result<T, PublishError>>;

/// Future resolving to the outcome of one publish.
#[derive(Debug)]
#[must_use = "a PublishHandle does nothing unless awaited or dropped deliberately"]
pub struct PublishHandle<T = MessageMetadata> {
    rx: oneshot::Receiver<Result<T, PublishError>>,
}

impl<T> PublishHandle<T> {
    pub(crate) fn channel() -> (ResultSender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A handle that is already resolved.
    pub fn ready(result: Result<T, PublishError>) -> Self {
        let (tx, handle) = Self::channel();
        // The receiver is alive in `handle`, so this cannot fail.
        let _ = tx.send(result);
        handle
    }
}

impl<T> Future for PublishHandle<T> {
    type Output = Result<T, PublishError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PublishError::Shutdown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_handle_resolves_immediately() {
        let handle: PublishHandle = PublishHandle::ready(Ok(MessageMetadata::new(1, 2)));
        assert_eq!(handle.await.unwrap(), MessageMetadata::new(1, 2));
    }

    #[tokio::test]
    async fn test_dropped_sender_reads_as_shutdown() {
        let (tx, handle) = PublishHandle::<MessageMetadata>::channel();
        drop(tx);
        assert!(matches!(handle.await, Err(PublishError::Shutdown)));
    }
}
