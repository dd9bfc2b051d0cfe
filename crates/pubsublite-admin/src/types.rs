//! Topic types returned by the control plane.

use pubsublite_core::TopicPath;
use serde::{Deserialize, Serialize};

/// Configuration for creating a new topic.
///
/// # Fields
///
/// * `path` - Fully-qualified topic path
/// * `partition_count` - Number of partitions (must be at least 1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub path: TopicPath,
    pub partition_count: u32,
}

impl TopicConfig {
    pub fn new(path: TopicPath, partition_count: u32) -> Self {
        Self {
            path,
            partition_count,
        }
    }
}

/// An existing topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub path: TopicPath,
    pub partition_count: u32,
}
