//! Resumable publish stream.
//!
//! A `ResumableStream` turns a transport that hands out one-shot
//! bidirectional streams into a logical long-lived stream. Each attempt is a
//! `StreamSession`; when a session fails with a retryable status the owner
//! asks for a new one, and the stream backs off, reopens, and replays the
//! initializer before handing it back.
//!
//! ## State machine
//!
//! ```text
//!            connect()
//!   Idle ───────────────▶ Connecting ──▶ Initializing ──▶ Active
//!    ▲                        ▲               │             │
//!    │                        │ backoff       │ retryable   │ resume(status)
//!    │                        └──────────── Error ◀─────────┘
//!    │                                        │
//!    └─────────── permanent / cancelled ──────┘
//! ```
//!
//! The stream never touches batches. Replaying unacknowledged work after a
//! resume is the owner's job; the stream only guarantees that a session it
//! returns has been initialized.
//!
//! ## Cancellation
//!
//! The cancellation token aborts backoff sleeps and prevents further
//! attempts. An attempt in progress when the token fires gets
//! `CANCELLED_ATTEMPT_GRACE` to finish, so a publisher shut down right after
//! it was created can still drain to a healthy server. A server that never
//! answers the initial request cannot hold shutdown up for longer.

use crate::retry::RetryPolicy;
use crate::transport::{PublishTransport, ResponseStream};
use async_trait::async_trait;
use futures::StreamExt;
use pubsublite_core::{InitialPublishRequest, PublishRequest, PublishResponse, TopicPath};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, error, info, warn};

/// Time an in-progress attempt may keep running after cancellation.
pub const CANCELLED_ATTEMPT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Initializing,
    Active,
    Error,
}

/// One live attempt of the bidirectional stream.
pub struct StreamSession {
    requests: mpsc::UnboundedSender<PublishRequest>,
    responses: ResponseStream,
}

impl StreamSession {
    /// Open a session on `transport`.
    pub async fn open(transport: &dyn PublishTransport) -> Result<Self, Status> {
        let (requests, rx) = mpsc::unbounded_channel();
        let responses = transport
            .open_stream(Box::pin(UnboundedReceiverStream::new(rx)))
            .await?;
        Ok(Self {
            requests,
            responses,
        })
    }

    /// Queue a request on the outbound half.
    pub fn write(&self, request: PublishRequest) -> Result<(), Status> {
        self.requests
            .send(request)
            .map_err(|_| Status::unavailable("publish stream closed for writes"))
    }

    /// Next response. A stream that finishes without an error status reads
    /// as `UNAVAILABLE`: the server hung up and the session must be resumed.
    pub async fn read(&mut self) -> Result<PublishResponse, Status> {
        match self.responses.next().await {
            Some(response) => response,
            None => Err(Status::unavailable("publish stream ended")),
        }
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("closed", &self.requests.is_closed())
            .finish()
    }
}

/// Step replayed on every new session before it is handed to the owner.
#[async_trait]
pub trait StreamInitializer: Send + Sync {
    async fn initialize(&self, session: &mut StreamSession) -> Result<(), Status>;
}

/// Pins a publish stream to one partition of a topic.
#[derive(Debug, Clone)]
pub struct PartitionInitializer {
    topic: TopicPath,
    partition: u32,
}

impl PartitionInitializer {
    pub fn new(topic: TopicPath, partition: u32) -> Self {
        Self { topic, partition }
    }
}

#[async_trait]
impl StreamInitializer for PartitionInitializer {
    async fn initialize(&self, session: &mut StreamSession) -> Result<(), Status> {
        session.write(PublishRequest::Initial(InitialPublishRequest {
            topic: self.topic.clone(),
            partition: self.partition as i64,
        }))?;
        match session.read().await? {
            PublishResponse::Initial(_) => Ok(()),
            PublishResponse::MessageResponse(_) => Err(Status::failed_precondition(
                "received a message response before the initial response",
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StreamError {
    /// The stream failed with a status that must not be retried.
    Permanent(Status),

    /// The owner cancelled the stream while it was backing off or
    /// connecting.
    Cancelled,
}

pub struct ResumableStream<I> {
    transport: Arc<dyn PublishTransport>,
    initializer: I,
    retry: RetryPolicy,
    cancel: CancellationToken,
    state: StreamState,

    /// Consecutive failed attempts since the last Active session.
    attempt: usize,

    partition: u32,
}

impl<I: StreamInitializer> ResumableStream<I> {
    pub fn new(
        transport: Arc<dyn PublishTransport>,
        initializer: I,
        retry: RetryPolicy,
        cancel: CancellationToken,
        partition: u32,
    ) -> Self {
        Self {
            transport,
            initializer,
            retry,
            cancel,
            state: StreamState::Idle,
            attempt: 0,
            partition,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether `status` would be retried by this stream.
    pub fn is_retryable(&self, status: &Status) -> bool {
        self.retry.is_retryable(status)
    }

    /// Establish an initialized session, retrying transient failures with
    /// backoff until one succeeds, a permanent failure occurs, or the stream
    /// is cancelled.
    pub async fn connect(&mut self) -> Result<StreamSession, StreamError> {
        loop {
            if self.attempt > 0 {
                let delay = self.retry.delay(self.attempt - 1);
                debug!(
                    partition = self.partition,
                    attempt = self.attempt,
                    backoff_ms = delay.as_millis() as u64,
                    "Backing off before reconnecting publish stream"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => {
                        self.close();
                        return Err(StreamError::Cancelled);
                    }
                }
            }
            if self.cancel.is_cancelled() && self.attempt > 0 {
                self.close();
                return Err(StreamError::Cancelled);
            }

            let cancel = self.cancel.clone();
            let outcome = tokio::select! {
                result = self.attempt_once() => Some(result),
                _ = grace_after(&cancel) => None,
            };
            let Some(result) = outcome else {
                warn!(
                    partition = self.partition,
                    state = ?self.state,
                    "Publish stream attempt abandoned after cancellation"
                );
                self.close();
                return Err(StreamError::Cancelled);
            };

            match result {
                Ok(session) => {
                    info!(
                        partition = self.partition,
                        attempts = self.attempt + 1,
                        "Publish stream established"
                    );
                    self.state = StreamState::Active;
                    self.attempt = 0;
                    return Ok(session);
                }
                Err(status) => self.record_failure(status)?,
            }
        }
    }

    /// Resume after the active session failed with `failure`.
    pub async fn resume(&mut self, failure: Status) -> Result<StreamSession, StreamError> {
        self.record_failure(failure)?;
        self.connect().await
    }

    /// Tear down. The owner drops its session; the stream stays usable and
    /// can be connected again.
    pub fn close(&mut self) {
        debug!(partition = self.partition, "Publish stream closed");
        self.state = StreamState::Idle;
        self.attempt = 0;
    }

    async fn attempt_once(&mut self) -> Result<StreamSession, Status> {
        self.state = StreamState::Connecting;
        let mut session = StreamSession::open(self.transport.as_ref()).await?;
        self.state = StreamState::Initializing;
        self.initializer.initialize(&mut session).await?;
        Ok(session)
    }

    fn record_failure(&mut self, status: Status) -> Result<(), StreamError> {
        self.state = StreamState::Error;
        if !self.retry.is_retryable(&status) {
            error!(
                partition = self.partition,
                code = ?status.code(),
                message = status.message(),
                "Publish stream failed permanently"
            );
            self.close();
            return Err(StreamError::Permanent(status));
        }
        self.attempt += 1;
        warn!(
            partition = self.partition,
            attempt = self.attempt,
            code = ?status.code(),
            message = status.message(),
            "Publish stream failed, will reconnect"
        );
        Ok(())
    }
}

async fn grace_after(cancel: &CancellationToken) {
    cancel.cancelled().await;
    tokio::time::sleep(CANCELLED_ATTEMPT_GRACE).await;
}
