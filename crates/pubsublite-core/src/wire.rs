//! Frames exchanged on the per-partition publish stream.
//!
//! ```text
//! client                                server
//!   │── Initial { topic, partition } ──▶│
//!   │◀── Initial ───────────────────────│
//!   │── MessagePublish [m0..mN] ───────▶│
//!   │◀── MessageResponse { start } ─────│   m_i stored at start + i
//!   │            ...                    │
//! ```
//!
//! The first request on every stream pins it to one partition; the server
//! answers with an initial response before any batch is accepted. Each batch
//! is acknowledged, in order, by one response naming the cursor of its first
//! message.

use crate::message::PubSubMessage;
use crate::metadata::Cursor;
use crate::topic::TopicPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialPublishRequest {
    pub topic: TopicPath,
    pub partition: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePublishRequest {
    pub messages: Vec<PubSubMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishRequest {
    Initial(InitialPublishRequest),
    MessagePublish(MessagePublishRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialPublishResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePublishResponse {
    /// Cursor assigned to the first message of the acknowledged batch.
    pub start_cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishResponse {
    Initial(InitialPublishResponse),
    MessageResponse(MessagePublishResponse),
}
