//! The publisher abstraction shared by the partition and topic publishers.

use crate::handle::PublishHandle;
use async_trait::async_trait;
use pubsublite_core::{MessageMetadata, PubSubMessage};

#[async_trait]
pub trait Publisher<T = MessageMetadata>: Send + Sync {
    /// Queue `message` for publishing. Never blocks; the outcome is observed
    /// through the returned handle.
    fn publish(&self, message: PubSubMessage) -> PublishHandle<T>;

    /// Send everything buffered now, and wait until every message published
    /// before this call has resolved.
    async fn flush(&self);

    /// Stop accepting messages, drain what is outstanding, and release the
    /// stream. Every outstanding handle is resolved before this returns.
    async fn shutdown(&self);
}
