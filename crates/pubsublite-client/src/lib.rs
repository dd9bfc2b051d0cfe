//! Pub/Sub Lite publisher.
//!
//! This crate takes "publish to a topic" requests, routes each message to a
//! partition, batches messages per partition, and keeps one resumable
//! bidirectional stream open per partition. Every publish resolves
//! asynchronously to the partition and offset the server stored it at.
//!
//! # Pipeline
//!
//! ```text
//! PublisherConnection        Message → PubSubMessage, ack → "partition:offset"
//!   └─ MultipartitionPublisher    partition count lookup, routing, lazy creation
//!        └─ PartitionPublisher    batching, in-flight tracking, resend on resume
//!             └─ ResumableStream  connect, initialize, backoff
//!                  └─ PublishTransport
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pubsublite_client::{Message, PublisherConnection, PublisherOptions};
//!
//! let connection = PublisherConnection::builder()
//!     .topic(topic)
//!     .admin(admin)
//!     .transport(transport)
//!     .options(PublisherOptions::builder().num_channels(4).build())
//!     .build()
//!     .await?;
//!
//! let ack = connection.publish(Message::new("order data").with_ordering_key("user123")).await?;
//! connection.shutdown().await;
//! ```

pub mod batching;
pub mod connection;
pub mod context;
pub mod error;
pub mod handle;
pub mod message;
pub mod multipartition_publisher;
pub mod options;
pub mod partition_publisher;
pub mod publisher;
pub mod resumable;
pub mod retry;
pub mod routing;
pub mod testing;
pub mod transport;

pub use batching::{BatchAssembler, BatchingOptions, MAX_BATCH_BYTES, MAX_BATCH_MESSAGE_COUNT};
pub use connection::{PublisherConnection, PublisherConnectionBuilder};
pub use context::ExecutionContext;
pub use error::{ClientError, PublishError, Result};
pub use handle::PublishHandle;
pub use message::{default_transformer, Message};
pub use multipartition_publisher::MultipartitionPublisher;
pub use options::{FailureHandler, MessageTransformer, PublisherOptions, PublisherOptionsBuilder};
pub use partition_publisher::{PartitionPublisher, PartitionSettings};
pub use publisher::Publisher;
pub use resumable::{ResumableStream, StreamInitializer, StreamSession, StreamState};
pub use retry::RetryPolicy;
pub use routing::RoutingPolicy;
pub use transport::{ChannelPool, PublishTransport, RequestStream, ResponseStream};

pub use pubsublite_core::{MessageMetadata, PubSubMessage, TopicPath};
