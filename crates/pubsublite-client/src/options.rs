//! Publisher configuration.
//!
//! All options are optional. Build them fluently:
//!
//! ```ignore
//! let options = PublisherOptions::builder()
//!     .max_batch_message_count(100)
//!     .flush_alarm_period(Duration::from_millis(10))
//!     .num_channels(4)
//!     .failure_handler(|e| eprintln!("partition failed: {}", e))
//!     .build();
//! ```
//!
//! or start from the environment with `PublisherOptions::from_env()`.
//!
//! ## Default Values
//!
//! - `max_batch_message_count`: 1000 (hard ceiling)
//! - `max_batch_bytes`: 3.5 MiB (hard ceiling)
//! - `flush_alarm_period`: 50ms
//! - `num_channels`: 1
//! - `retry_policy`: 100ms initial, 30s max, x2, jittered
//! - `partition_count_refresh_period`: 60s
//! - `message_transformer`: `message::default_transformer`
//! - `failure_handler`: none

use crate::batching::{
    BatchingOptions, DEFAULT_FLUSH_ALARM_PERIOD, MAX_BATCH_BYTES, MAX_BATCH_MESSAGE_COUNT,
};
use crate::error::{ClientError, PublishError, Result};
use crate::message::{default_transformer, Message};
use crate::retry::RetryPolicy;
use pubsublite_core::PubSubMessage;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

pub const ENV_MAX_BATCH_MESSAGES: &str = "PUBSUBLITE_MAX_BATCH_MESSAGES";
pub const ENV_MAX_BATCH_BYTES: &str = "PUBSUBLITE_MAX_BATCH_BYTES";
pub const ENV_FLUSH_ALARM_MS: &str = "PUBSUBLITE_FLUSH_ALARM_MS";
pub const ENV_NUM_CHANNELS: &str = "PUBSUBLITE_NUM_CHANNELS";

/// Converts a public message into the wire message. A failure resolves the
/// publish future with the returned error without touching the network.
pub type MessageTransformer =
    Arc<dyn Fn(Message) -> std::result::Result<PubSubMessage, PublishError> + Send + Sync>;

/// Observes the first permanent failure of any partition.
pub type FailureHandler = Arc<dyn Fn(&PublishError) + Send + Sync>;

#[derive(Clone)]
pub struct PublisherOptions {
    pub max_batch_message_count: usize,
    pub max_batch_bytes: usize,
    pub flush_alarm_period: Duration,
    pub num_channels: usize,
    pub retry_policy: RetryPolicy,
    pub partition_count_refresh_period: Duration,
    pub message_transformer: MessageTransformer,
    pub failure_handler: Option<FailureHandler>,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            max_batch_message_count: MAX_BATCH_MESSAGE_COUNT,
            max_batch_bytes: MAX_BATCH_BYTES,
            flush_alarm_period: DEFAULT_FLUSH_ALARM_PERIOD,
            num_channels: 1,
            retry_policy: RetryPolicy::default(),
            partition_count_refresh_period: Duration::from_secs(60),
            message_transformer: Arc::new(default_transformer),
            failure_handler: None,
        }
    }
}

impl PublisherOptions {
    pub fn builder() -> PublisherOptionsBuilder {
        PublisherOptionsBuilder::new()
    }

    /// Defaults overridden by `PUBSUBLITE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `PUBSUBLITE_*` variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(count) = parse_var::<usize, _>(&lookup, ENV_MAX_BATCH_MESSAGES)? {
            builder = builder.max_batch_message_count(count);
        }
        if let Some(bytes) = parse_var::<usize, _>(&lookup, ENV_MAX_BATCH_BYTES)? {
            builder = builder.max_batch_bytes(bytes);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_FLUSH_ALARM_MS)? {
            builder = builder.flush_alarm_period(Duration::from_millis(ms));
        }
        if let Some(channels) = parse_var::<usize, _>(&lookup, ENV_NUM_CHANNELS)? {
            builder = builder.num_channels(channels);
        }
        Ok(builder.build())
    }

    /// Batching thresholds, clamped to the protocol ceilings.
    pub fn batching(&self) -> BatchingOptions {
        BatchingOptions::new(
            self.max_batch_message_count,
            self.max_batch_bytes,
            self.flush_alarm_period,
        )
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ClientError::ConfigError(format!("{}='{}': {}", name, raw, e))),
    }
}

impl fmt::Debug for PublisherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherOptions")
            .field("max_batch_message_count", &self.max_batch_message_count)
            .field("max_batch_bytes", &self.max_batch_bytes)
            .field("flush_alarm_period", &self.flush_alarm_period)
            .field("num_channels", &self.num_channels)
            .field("retry_policy", &self.retry_policy)
            .field(
                "partition_count_refresh_period",
                &self.partition_count_refresh_period,
            )
            .field("failure_handler", &self.failure_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for `PublisherOptions`.
pub struct PublisherOptionsBuilder {
    options: PublisherOptions,
}

impl Default for PublisherOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PublisherOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: PublisherOptions::default(),
        }
    }

    /// Maximum messages per batch. Values above 1000 are clamped.
    pub fn max_batch_message_count(mut self, count: usize) -> Self {
        self.options.max_batch_message_count = count.clamp(1, MAX_BATCH_MESSAGE_COUNT);
        self
    }

    /// Maximum bytes per batch. Values above 3.5 MiB are clamped.
    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.options.max_batch_bytes = bytes.clamp(1, MAX_BATCH_BYTES);
        self
    }

    /// How long the first message of a batch may wait before the batch is
    /// sent regardless of its size.
    pub fn flush_alarm_period(mut self, period: Duration) -> Self {
        self.options.flush_alarm_period = period;
        self
    }

    /// Number of transports partitions are spread over.
    pub fn num_channels(mut self, channels: usize) -> Self {
        self.options.num_channels = channels.max(1);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.options.retry_policy = policy;
        self
    }

    pub fn partition_count_refresh_period(mut self, period: Duration) -> Self {
        self.options.partition_count_refresh_period = period;
        self
    }

    pub fn message_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(Message) -> std::result::Result<PubSubMessage, PublishError> + Send + Sync + 'static,
    {
        self.options.message_transformer = Arc::new(transformer);
        self
    }

    pub fn failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PublishError) + Send + Sync + 'static,
    {
        self.options.failure_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> PublisherOptions {
        self.options
    }
}

/// Calls the failure handler at most once, however many partitions fail.
pub(crate) struct FailureNotifier {
    handler: Option<FailureHandler>,
    fired: AtomicBool,
}

impl FailureNotifier {
    pub(crate) fn new(handler: Option<FailureHandler>) -> Self {
        Self {
            handler,
            fired: AtomicBool::new(false),
        }
    }

    pub(crate) fn notify(&self, error: &PublishError) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        error!(error = %error, code = ?error.code(), "Publisher failed permanently");
        if let Some(handler) = &self.handler {
            handler(error);
        }
    }
}

impl fmt::Debug for FailureNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureNotifier")
            .field("fired", &self.fired.load(Ordering::SeqCst))
            .finish()
    }
}
