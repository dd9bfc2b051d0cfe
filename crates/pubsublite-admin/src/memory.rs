//! In-process control plane.
//!
//! `InMemoryAdminClient` keeps topics in a map behind a `tokio::sync::RwLock`.
//! It behaves like the real service for everything the publisher relies on
//! (not-found errors, partition counts that only grow) and lets tests inject
//! failures into `get_topic_partition_count`.

use crate::error::{AdminError, Result};
use crate::types::{Topic, TopicConfig};
use crate::AdminClient;
use async_trait::async_trait;
use pubsublite_core::TopicPath;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tonic::Status;
use tracing::debug;

#[derive(Debug, Default)]
pub struct InMemoryAdminClient {
    /// Key: fully-qualified topic path
    topics: RwLock<HashMap<String, Topic>>,

    /// Errors returned, in order, by the next partition count lookups.
    injected_failures: Mutex<VecDeque<Status>>,

    partition_count_requests: AtomicUsize,
}

impl InMemoryAdminClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next partition count lookup fail with `status`. Calls stack:
    /// each injected status is consumed by one lookup.
    pub async fn inject_partition_count_failure(&self, status: Status) {
        self.injected_failures.lock().await.push_back(status);
    }

    /// Number of `get_topic_partition_count` calls served so far, including
    /// failed ones.
    pub fn partition_count_requests(&self) -> usize {
        self.partition_count_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminClient for InMemoryAdminClient {
    async fn create_topic(&self, config: TopicConfig) -> Result<Topic> {
        if config.partition_count == 0 {
            return Err(AdminError::InvalidArgument(
                "partition_count must be at least 1".to_string(),
            ));
        }

        let key = config.path.to_string();
        let mut topics = self.topics.write().await;
        if topics.contains_key(&key) {
            return Err(AdminError::TopicAlreadyExists(key));
        }

        let topic = Topic {
            path: config.path,
            partition_count: config.partition_count,
        };
        topics.insert(key.clone(), topic.clone());
        debug!(topic = %key, partitions = topic.partition_count, "Created topic");
        Ok(topic)
    }

    async fn get_topic(&self, topic: &TopicPath) -> Result<Topic> {
        let key = topic.to_string();
        self.topics
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(AdminError::TopicNotFound(key))
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let topics = self.topics.read().await;
        let mut all: Vec<Topic> = topics.values().cloned().collect();
        all.sort_by_key(|t| t.path.to_string());
        Ok(all)
    }

    async fn update_topic_partitions(
        &self,
        topic: &TopicPath,
        partition_count: u32,
    ) -> Result<Topic> {
        let key = topic.to_string();
        let mut topics = self.topics.write().await;
        let existing = topics
            .get_mut(&key)
            .ok_or_else(|| AdminError::TopicNotFound(key.clone()))?;

        if partition_count < existing.partition_count {
            return Err(AdminError::InvalidArgument(format!(
                "cannot shrink {} from {} to {} partitions",
                key, existing.partition_count, partition_count
            )));
        }

        existing.partition_count = partition_count;
        debug!(topic = %key, partitions = partition_count, "Updated partition count");
        Ok(existing.clone())
    }

    async fn delete_topic(&self, topic: &TopicPath) -> Result<()> {
        let key = topic.to_string();
        self.topics
            .write()
            .await
            .remove(&key)
            .map(|_| ())
            .ok_or(AdminError::TopicNotFound(key))
    }

    async fn get_topic_partition_count(&self, topic: &TopicPath) -> Result<u32> {
        self.partition_count_requests.fetch_add(1, Ordering::SeqCst);

        if let Some(status) = self.injected_failures.lock().await.pop_front() {
            return Err(status.into());
        }

        Ok(self.get_topic(topic).await?.partition_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn topic(name: &str) -> TopicPath {
        format!("projects/p/locations/us-central1-a/topics/{}", name)
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_partition_count() {
        let admin = InMemoryAdminClient::new();
        admin.create_topic(TopicConfig::new(topic("orders"), 3)).await.unwrap();

        assert_eq!(admin.get_topic_partition_count(&topic("orders")).await.unwrap(), 3);
        assert_eq!(admin.partition_count_requests(), 1);
    }

    #[tokio::test]
    async fn test_missing_topic_is_not_found() {
        let admin = InMemoryAdminClient::new();
        let err = admin
            .get_topic_partition_count(&topic("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_topics_rejected() {
        let admin = InMemoryAdminClient::new();
        admin.create_topic(TopicConfig::new(topic("t"), 1)).await.unwrap();

        let dup = admin.create_topic(TopicConfig::new(topic("t"), 1)).await;
        assert!(matches!(dup, Err(AdminError::TopicAlreadyExists(_))));

        let empty = admin.create_topic(TopicConfig::new(topic("u"), 0)).await;
        assert!(matches!(empty, Err(AdminError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_partition_count_only_grows() {
        let admin = InMemoryAdminClient::new();
        admin.create_topic(TopicConfig::new(topic("t"), 2)).await.unwrap();

        let grown = admin.update_topic_partitions(&topic("t"), 5).await.unwrap();
        assert_eq!(grown.partition_count, 5);

        let shrink = admin.update_topic_partitions(&topic("t"), 1).await;
        assert!(matches!(shrink, Err(AdminError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let admin = InMemoryAdminClient::new();
        admin.create_topic(TopicConfig::new(topic("t"), 1)).await.unwrap();
        admin
            .inject_partition_count_failure(Status::unavailable("down"))
            .await;
        admin
            .inject_partition_count_failure(Status::permission_denied("nope"))
            .await;

        let first = admin.get_topic_partition_count(&topic("t")).await.unwrap_err();
        assert_eq!(first.code(), Code::Unavailable);
        let second = admin.get_topic_partition_count(&topic("t")).await.unwrap_err();
        assert!(matches!(second, AdminError::PermissionDenied(_)));
        assert_eq!(admin.get_topic_partition_count(&topic("t")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let admin = InMemoryAdminClient::new();
        admin.create_topic(TopicConfig::new(topic("b"), 1)).await.unwrap();
        admin.create_topic(TopicConfig::new(topic("a"), 1)).await.unwrap();

        let names: Vec<String> = admin
            .list_topics()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.path.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        admin.delete_topic(&topic("a")).await.unwrap();
        assert!(admin.get_topic(&topic("a")).await.is_err());
        assert!(admin.delete_topic(&topic("a")).await.is_err());
    }
}
