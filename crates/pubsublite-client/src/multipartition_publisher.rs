//! Topic-wide publisher.
//!
//! `MultipartitionPublisher` looks up the partition count of its topic when
//! it is built, routes every message to a partition, and creates the
//! `PartitionPublisher` for a partition the first time a message is routed
//! to it.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────────────┐
//!   publish(msg) ────▶ │ RoutingPolicy            │
//!                      │  key → SHA-256 mod N     │
//!                      │  no key → round-robin    │
//!                      └────────────┬─────────────┘
//!                                   │ partition p
//!                      ┌────────────▼─────────────┐
//!                      │ publishers: p → Arc<..>  │  created lazily,
//!                      │ (Mutex, shutting_down)   │  never shared
//!                      └──┬──────────┬──────────┬─┘
//!                         ▼          ▼          ▼
//!                    Partition  Partition  Partition
//!                    Publisher  Publisher  Publisher
//! ```
//!
//! A background task polls the control plane for the partition count.
//! Increases are applied so new partitions become routable; a count that
//! goes down, or a failed lookup, is logged and ignored.

use crate::context::ExecutionContext;
use crate::error::{ClientError, PublishError, Result};
use crate::handle::PublishHandle;
use crate::options::{FailureNotifier, PublisherOptions};
use crate::partition_publisher::{PartitionPublisher, PartitionSettings};
use crate::publisher::Publisher;
use crate::routing::RoutingPolicy;
use crate::transport::ChannelPool;
use async_trait::async_trait;
use futures::future::join_all;
use pubsublite_admin::AdminClient;
use pubsublite_core::{PubSubMessage, TopicPath};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Default)]
struct PublisherMap {
    shutting_down: bool,
    by_partition: HashMap<u32, Arc<PartitionPublisher>>,
}

pub struct MultipartitionPublisher {
    topic: TopicPath,
    channels: ChannelPool,
    settings: PartitionSettings,
    routing: RoutingPolicy,
    context: ExecutionContext,
    partition_count: Arc<AtomicU32>,
    publishers: Mutex<PublisherMap>,

    /// Stops the partition count refresher.
    refresh_stop: CancellationToken,
}

impl MultipartitionPublisher {
    /// Look up the partition count of `topic` and start the publisher.
    ///
    /// Fails without starting any background work if the lookup fails or
    /// the topic has no partitions.
    pub async fn new(
        topic: TopicPath,
        admin: Arc<dyn AdminClient>,
        channels: ChannelPool,
        options: &PublisherOptions,
        context: ExecutionContext,
    ) -> Result<Self> {
        let partition_count = admin.get_topic_partition_count(&topic).await?;
        if partition_count == 0 {
            return Err(ClientError::InvalidArgument(format!(
                "topic {} has no partitions",
                topic
            )));
        }
        info!(topic = %topic, partition_count, "Multipartition publisher started");

        let notifier = Arc::new(FailureNotifier::new(options.failure_handler.clone()));
        let settings = PartitionSettings::new(options.batching(), options.retry_policy.clone())
            .with_notifier(notifier);
        let partition_count = Arc::new(AtomicU32::new(partition_count));
        let refresh_stop = context.child_token();

        context.spawn(refresh_partition_count(
            admin,
            topic.clone(),
            Arc::clone(&partition_count),
            options.partition_count_refresh_period,
            refresh_stop.clone(),
        ));

        Ok(Self {
            topic,
            channels,
            settings,
            routing: RoutingPolicy::new(),
            context,
            partition_count,
            publishers: Mutex::new(PublisherMap::default()),
            refresh_stop,
        })
    }

    pub fn topic(&self) -> &TopicPath {
        &self.topic
    }

    /// Partition count currently used for routing.
    pub fn partition_count(&self) -> u32 {
        self.partition_count.load(Ordering::SeqCst)
    }

    /// Partitions that have a live publisher, in ascending order.
    pub fn live_partitions(&self) -> Vec<u32> {
        let mut partitions: Vec<u32> = self.lock().by_partition.keys().copied().collect();
        partitions.sort_unstable();
        partitions
    }

    fn lock(&self) -> MutexGuard<'_, PublisherMap> {
        // The map is never left half-updated, so a poisoned lock is usable.
        self.publishers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publisher_for(&self, partition: u32) -> Option<Arc<PartitionPublisher>> {
        let mut map = self.lock();
        if map.shutting_down {
            return None;
        }
        let publisher = map.by_partition.entry(partition).or_insert_with(|| {
            debug!(topic = %self.topic, partition, "Creating partition publisher");
            Arc::new(PartitionPublisher::new(
                self.topic.clone(),
                partition,
                self.channels.for_partition(partition),
                self.settings.clone(),
                &self.context,
            ))
        });
        Some(Arc::clone(publisher))
    }

    fn live_publishers(&self) -> Vec<Arc<PartitionPublisher>> {
        self.lock().by_partition.values().cloned().collect()
    }
}

#[async_trait]
impl Publisher for MultipartitionPublisher {
    fn publish(&self, message: PubSubMessage) -> PublishHandle {
        let partition = match self.routing.route(&message.key, self.partition_count()) {
            Ok(partition) => partition,
            Err(e) => return PublishHandle::ready(Err(PublishError::InvalidMessage(e.to_string()))),
        };
        match self.publisher_for(partition) {
            Some(publisher) => publisher.publish(message),
            None => PublishHandle::ready(Err(PublishError::Shutdown)),
        }
    }

    async fn flush(&self) {
        join_all(self.live_publishers().iter().map(|p| p.flush())).await;
    }

    async fn shutdown(&self) {
        let publishers: Vec<Arc<PartitionPublisher>> = {
            let mut map = self.lock();
            map.shutting_down = true;
            map.by_partition.values().cloned().collect()
        };
        self.refresh_stop.cancel();
        info!(
            topic = %self.topic,
            partitions = publishers.len(),
            "Shutting down multipartition publisher"
        );
        join_all(publishers.iter().map(|p| p.shutdown())).await;
    }
}

impl Drop for MultipartitionPublisher {
    fn drop(&mut self) {
        self.refresh_stop.cancel();
    }
}

async fn refresh_partition_count(
    admin: Arc<dyn AdminClient>,
    topic: TopicPath,
    partition_count: Arc<AtomicU32>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match admin.get_topic_partition_count(&topic).await {
            Ok(count) => {
                let previous = partition_count.fetch_max(count, Ordering::SeqCst);
                if count > previous {
                    info!(topic = %topic, previous, count, "Partition count increased");
                } else if count < previous {
                    warn!(
                        topic = %topic,
                        previous,
                        count,
                        "Partition count decreased, keeping the larger count"
                    );
                }
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to refresh partition count");
            }
        }
    }
    debug!(topic = %topic, "Partition count refresh stopped");
}
