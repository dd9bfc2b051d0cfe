//! Core data model for the Pub/Sub Lite publisher.
//!
//! This crate holds the types shared by the control plane (`pubsublite-admin`)
//! and the publisher pipeline (`pubsublite-client`):
//!
//! - **Topic paths**: `projects/{project}/locations/{location}/topics/{name}`
//! - **Messages**: the wire-level `PubSubMessage` and its size estimate
//! - **Cursors**: server-assigned offsets within a partition
//! - **MessageMetadata**: `(partition, offset)` acknowledgement and its
//!   `"partition:offset"` text form
//! - **Publish stream frames**: requests and responses exchanged on the
//!   per-partition bidirectional stream
//!
//! Nothing here performs I/O.

pub mod error;
pub mod message;
pub mod metadata;
pub mod topic;
pub mod wire;

pub use error::{Error, Result};
pub use message::{AttributeValues, PubSubMessage};
pub use metadata::{Cursor, MessageMetadata};
pub use topic::{Location, ProjectId, TopicPath};
pub use wire::{
    InitialPublishRequest, InitialPublishResponse, MessagePublishRequest,
    MessagePublishResponse, PublishRequest, PublishResponse,
};
