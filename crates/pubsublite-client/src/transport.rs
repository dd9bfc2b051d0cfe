//! Transport seam for the per-partition publish stream.
//!
//! A `PublishTransport` opens one bidirectional stream: the caller supplies
//! the outbound request stream and gets back the inbound response stream,
//! the same shape as a tonic bidi-streaming client call
//! (`client.publish(Request::new(outbound)).await?.into_inner()`). A gRPC
//! implementation wraps a generated client; tests use
//! `testing::InMemoryTransport`.
//!
//! ## Channel pool
//!
//! ```text
//!  partition 0 ─┐
//!  partition 3 ─┼─▶ transport 0
//!  partition 6 ─┘
//!  partition 1 ─┬─▶ transport 1        num_channels = 3
//!  partition 4 ─┘
//!  partition 2 ───▶ transport 2
//! ```
//!
//! Partition `p` always uses transport `p % num_channels`, so a partition's
//! reconnects reuse the same underlying channel.

use async_trait::async_trait;
use futures::stream::BoxStream;
use pubsublite_core::{PublishRequest, PublishResponse};
use std::sync::Arc;
use tonic::Status;
use tracing::debug;

/// Outbound half of a publish stream.
pub type RequestStream = BoxStream<'static, PublishRequest>;

/// Inbound half of a publish stream. The stream ends with an `Err` item, or
/// by finishing, when the server closes it.
pub type ResponseStream = BoxStream<'static, Result<PublishResponse, Status>>;

#[async_trait]
pub trait PublishTransport: Send + Sync + 'static {
    /// Open a new publish stream fed by `requests`.
    async fn open_stream(&self, requests: RequestStream) -> Result<ResponseStream, Status>;
}

/// Fixed set of transports shared by all partition publishers of a topic.
#[derive(Clone)]
pub struct ChannelPool {
    channels: Vec<Arc<dyn PublishTransport>>,
}

impl ChannelPool {
    /// Build `num_channels` transports (at least one) with `factory`, which
    /// receives the channel index.
    pub fn new<F>(num_channels: usize, factory: F) -> Self
    where
        F: Fn(usize) -> Arc<dyn PublishTransport>,
    {
        let count = num_channels.max(1);
        debug!(num_channels = count, "Creating publish channel pool");
        Self {
            channels: (0..count).map(factory).collect(),
        }
    }

    /// A pool where every partition shares one transport.
    pub fn single(transport: Arc<dyn PublishTransport>) -> Self {
        Self {
            channels: vec![transport],
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn for_partition(&self, partition: u32) -> Arc<dyn PublishTransport> {
        let index = partition as usize % self.channels.len();
        Arc::clone(&self.channels[index])
    }
}

impl std::fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPool")
            .field("num_channels", &self.channels.len())
            .finish()
    }
}
