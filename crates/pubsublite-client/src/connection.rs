//! Public publishing API.
//!
//! `PublisherConnection` is what applications hold. It converts public
//! `Message`s into wire messages, hands them to the topic publisher, and
//! turns each acknowledgement into an opaque string of the form
//! `"partition:offset"`. It owns the execution context of the pipeline:
//! shutting the connection down drains the publisher and then waits for
//! every background task.
//!
//! ## Example
//!
//! ```ignore
//! let connection = PublisherConnection::builder()
//!     .topic("projects/my-project/locations/us-central1-a/topics/orders".parse()?)
//!     .admin(admin)
//!     .transport_factory(|_channel| Arc::new(GrpcTransport::connect(endpoint)) as _)
//!     .options(PublisherOptions::from_env()?)
//!     .build()
//!     .await?;
//!
//! let ack = connection
//!     .publish(Message::new("hello").with_ordering_key("user-1"))
//!     .await?;
//! println!("stored at {}", ack);
//!
//! connection.shutdown().await;
//! ```

use crate::context::ExecutionContext;
use crate::error::{ClientError, PublishError, Result};
use crate::message::Message;
use crate::multipartition_publisher::MultipartitionPublisher;
use crate::options::{MessageTransformer, PublisherOptions};
use crate::publisher::Publisher;
use crate::transport::{ChannelPool, PublishTransport};
use futures::future::{self, BoxFuture};
use pubsublite_admin::AdminClient;
use pubsublite_core::{MessageMetadata, TopicPath};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

type TransportFactory = Arc<dyn Fn(usize) -> Arc<dyn PublishTransport> + Send + Sync>;

pub struct PublisherConnection {
    publisher: Arc<dyn Publisher<MessageMetadata>>,
    transformer: MessageTransformer,
    context: ExecutionContext,
}

impl PublisherConnection {
    pub fn builder() -> PublisherConnectionBuilder {
        PublisherConnectionBuilder::new()
    }

    /// Wrap an existing publisher. Used to put a mock behind the public API.
    pub fn with_publisher(
        publisher: Arc<dyn Publisher<MessageMetadata>>,
        transformer: MessageTransformer,
        context: ExecutionContext,
    ) -> Self {
        Self {
            publisher,
            transformer,
            context,
        }
    }

    /// Publish `message`, resolving to its acknowledgement string.
    ///
    /// A message the transformer rejects resolves to that error without
    /// reaching the publisher.
    pub fn publish(
        &self,
        message: Message,
    ) -> BoxFuture<'static, std::result::Result<String, PublishError>> {
        match (self.transformer)(message) {
            Ok(wire) => {
                let handle = self.publisher.publish(wire);
                Box::pin(async move { handle.await.map(|metadata| metadata.to_string()) })
            }
            Err(e) => Box::pin(future::ready(Err(e))),
        }
    }

    pub async fn flush(&self) {
        self.publisher.flush().await;
    }

    /// Drain the publisher and stop every background task. All outstanding
    /// publish futures are resolved when this returns.
    pub async fn shutdown(&self) {
        self.publisher.shutdown().await;
        self.context.shutdown().await;
        info!("Publisher connection shut down");
    }
}

/// Builder for `PublisherConnection`.
///
/// # Required Fields
///
/// - `topic`
/// - `admin`: control plane used for the partition count
/// - `transport` or `transport_factory`
pub struct PublisherConnectionBuilder {
    topic: Option<TopicPath>,
    admin: Option<Arc<dyn AdminClient>>,
    transport_factory: Option<TransportFactory>,
    options: PublisherOptions,
    runtime: Option<Handle>,
}

impl Default for PublisherConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PublisherConnectionBuilder {
    pub fn new() -> Self {
        Self {
            topic: None,
            admin: None,
            transport_factory: None,
            options: PublisherOptions::default(),
            runtime: None,
        }
    }

    pub fn topic(mut self, topic: TopicPath) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn admin(mut self, admin: Arc<dyn AdminClient>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Use one transport for every channel.
    pub fn transport(self, transport: Arc<dyn PublishTransport>) -> Self {
        self.transport_factory(move |_| Arc::clone(&transport))
    }

    /// Create channel `i` of the pool with `factory(i)`.
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize) -> Arc<dyn PublishTransport> + Send + Sync + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    pub fn options(mut self, options: PublisherOptions) -> Self {
        self.options = options;
        self
    }

    /// Run background tasks on `runtime` instead of the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Look up the topic and start the pipeline.
    pub async fn build(self) -> Result<PublisherConnection> {
        let topic = self
            .topic
            .ok_or_else(|| ClientError::ConfigError("topic is required".to_string()))?;
        let admin = self
            .admin
            .ok_or_else(|| ClientError::ConfigError("admin client is required".to_string()))?;
        let factory = self
            .transport_factory
            .ok_or_else(|| ClientError::ConfigError("transport is required".to_string()))?;

        let context = match self.runtime {
            Some(handle) => ExecutionContext::from_handle(handle),
            None => ExecutionContext::current()?,
        };
        let channels = ChannelPool::new(self.options.num_channels, |i| factory(i));
        let publisher =
            MultipartitionPublisher::new(topic, admin, channels, &self.options, context.clone())
                .await?;

        Ok(PublisherConnection {
            publisher: Arc::new(publisher),
            transformer: self.options.message_transformer,
            context,
        })
    }
}
