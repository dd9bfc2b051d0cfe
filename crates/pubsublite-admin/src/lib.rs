//! Pub/Sub Lite control plane.
//!
//! The publisher needs exactly one thing from the control plane: how many
//! partitions a topic has. This crate defines the `AdminClient` trait that
//! answers that question (plus the topic lifecycle calls used to set up and
//! resize topics) and an in-process implementation for tests and demos.
//!
//! ## Usage Example
//!
//! ```ignore
//! use pubsublite_admin::{AdminClient, InMemoryAdminClient, TopicConfig};
//!
//! let admin = InMemoryAdminClient::new();
//! admin.create_topic(TopicConfig::new(topic.clone(), 3)).await?;
//!
//! assert_eq!(admin.get_topic_partition_count(&topic).await?, 3);
//! ```
//!
//! ### Thread Safety
//! Implementations must be `Send + Sync`; the publisher shares one client
//! between construction and its background partition-count refresh task.

pub mod error;
pub mod memory;
pub mod types;

pub use error::{AdminError, Result};
pub use memory::InMemoryAdminClient;
pub use types::{Topic, TopicConfig};

use async_trait::async_trait;
use pubsublite_core::TopicPath;

#[async_trait]
pub trait AdminClient: Send + Sync {
    // ============================================================
    // TOPIC OPERATIONS
    // ============================================================

    /// Create a topic. Fails with `TopicAlreadyExists` on a duplicate path.
    async fn create_topic(&self, config: TopicConfig) -> Result<Topic>;

    async fn get_topic(&self, topic: &TopicPath) -> Result<Topic>;

    async fn list_topics(&self) -> Result<Vec<Topic>>;

    /// Raise the partition count of a topic. Partition counts never shrink.
    async fn update_topic_partitions(&self, topic: &TopicPath, partition_count: u32)
        -> Result<Topic>;

    async fn delete_topic(&self, topic: &TopicPath) -> Result<()>;

    // ============================================================
    // PARTITION OPERATIONS
    // ============================================================

    /// Current partition count of a topic.
    ///
    /// Fails with `TopicNotFound` when the topic does not exist and with
    /// `PermissionDenied` / `Rpc` when the control plane refuses or cannot be
    /// reached.
    async fn get_topic_partition_count(&self, topic: &TopicPath) -> Result<u32>;
}
