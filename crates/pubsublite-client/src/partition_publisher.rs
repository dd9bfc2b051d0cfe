//! Publisher for a single partition.
//!
//! A `PartitionPublisher` is a handle to a worker task that owns everything
//! about one partition: the batch assembler, the resumable stream and the
//! queues of batches waiting to be written or acknowledged. The handle only
//! sends commands, so `publish()` never blocks.
//!
//! ## Batch lifecycle
//!
//! ```text
//!  publish ──▶ assembler ──seal──▶ unsent ──write──▶ in_flight ──ack──▶ resolved
//!                                    ▲                   │
//!                                    └──── stream fails ─┘ (retryable)
//! ```
//!
//! Acknowledgements arrive in the order batches were written, so the front
//! of `in_flight` is always the batch an acknowledgement belongs to. When a
//! retryable failure breaks the stream, `in_flight` is moved back to the
//! front of `unsent` in its original order, and everything is written again
//! on the next session before any newer batch. A batch is only resolved by
//! an acknowledgement on the session it was last written to, so no message
//! is resolved twice.
//!
//! ## Failure
//!
//! A non-retryable status, or a server that breaks the protocol, fails the
//! partition permanently: every outstanding message and every later publish
//! resolves with that error.
//!
//! ## Shutdown
//!
//! Shutdown stops accepting messages and drains: the open batch is sealed,
//! and the worker exits once every batch has been acknowledged. If the
//! stream breaks while draining, or is backing off when shutdown starts,
//! the remaining messages are resolved with the error instead of
//! reconnecting.

use crate::batching::{Batch, BatchAssembler, BatchingOptions, PendingMessage};
use crate::context::ExecutionContext;
use crate::error::PublishError;
use crate::handle::PublishHandle;
use crate::options::FailureNotifier;
use crate::publisher::Publisher;
use crate::resumable::{PartitionInitializer, ResumableStream, StreamError, StreamSession};
use crate::retry::RetryPolicy;
use crate::transport::PublishTransport;
use async_trait::async_trait;
use pubsublite_core::{PubSubMessage, PublishResponse, TopicPath};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, info, trace, warn};

/// Per-partition settings derived from the publisher options.
#[derive(Debug, Clone)]
pub struct PartitionSettings {
    pub batching: BatchingOptions,
    pub retry: RetryPolicy,
    notifier: Arc<FailureNotifier>,
}

impl PartitionSettings {
    pub fn new(batching: BatchingOptions, retry: RetryPolicy) -> Self {
        Self {
            batching,
            retry,
            notifier: Arc::new(FailureNotifier::new(None)),
        }
    }

    pub(crate) fn with_notifier(mut self, notifier: Arc<FailureNotifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

enum Command {
    Publish(PendingMessage),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug)]
pub struct PartitionPublisher {
    partition: u32,
    commands: mpsc::UnboundedSender<Command>,

    /// Aborts reconnect backoff once shutdown starts.
    cancel: CancellationToken,
}

impl PartitionPublisher {
    /// Start a publisher for `partition` of `topic`. The worker is spawned
    /// on `context` and connects immediately.
    pub fn new(
        topic: TopicPath,
        partition: u32,
        transport: Arc<dyn PublishTransport>,
        settings: PartitionSettings,
        context: &ExecutionContext,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let cancel = context.child_token();
        let stream = ResumableStream::new(
            transport,
            PartitionInitializer::new(topic.clone(), partition),
            settings.retry,
            cancel.clone(),
            partition,
        );
        let worker = Worker {
            topic,
            partition,
            commands: rx,
            commands_closed: false,
            accepting: true,
            assembler: BatchAssembler::new(settings.batching),
            stream,
            session: None,
            unsent: VecDeque::new(),
            in_flight: VecDeque::new(),
            resolved_through: 0,
            flush_waiters: Vec::new(),
            shutdown_waiters: Vec::new(),
            failure: None,
            notifier: settings.notifier,
        };
        context.spawn(worker.run());

        Self {
            partition,
            commands,
            cancel,
        }
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }
}

impl Command {
    fn kind(&self) -> &'static str {
        match self {
            Command::Publish(_) => "publish",
            Command::Flush(_) => "flush",
            Command::Shutdown(_) => "shutdown",
        }
    }
}

#[async_trait]
impl Publisher for PartitionPublisher {
    fn publish(&self, message: PubSubMessage) -> PublishHandle {
        let (pending, handle) = PendingMessage::new(message);
        // If the worker is gone the command is dropped along with its
        // sender, and the handle resolves to Shutdown.
        let _ = self.commands.send(Command::Publish(pending));
        handle
    }

    async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let sent = self.commands.send(Command::Shutdown(tx));
        self.cancel.cancel();
        if sent.is_ok() {
            let _ = rx.await;
        }
    }
}

struct Worker {
    topic: TopicPath,
    partition: u32,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_closed: bool,

    /// False once shutdown has started.
    accepting: bool,

    assembler: BatchAssembler,
    stream: ResumableStream<PartitionInitializer>,
    session: Option<StreamSession>,

    /// Sealed batches not yet written to the current session.
    unsent: VecDeque<Batch>,

    /// Batches written to the current session, awaiting acknowledgement.
    in_flight: VecDeque<Batch>,

    /// Every batch up to this sequence has been resolved.
    resolved_through: u64,

    flush_waiters: Vec<(u64, oneshot::Sender<()>)>,
    shutdown_waiters: Vec<oneshot::Sender<()>>,

    /// Set once the partition can no longer publish.
    failure: Option<PublishError>,

    notifier: Arc<FailureNotifier>,
}

impl Worker {
    async fn run(mut self) {
        info!(topic = %self.topic, partition = self.partition, "Partition publisher started");
        self.connect(None).await;

        loop {
            if !self.accepting && !self.has_outstanding() {
                break;
            }
            self.write_unsent();

            let alarm = self.assembler.alarm_deadline();
            tokio::select! {
                command = self.commands.recv(), if !self.commands_closed => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(partition = self.partition, "All publisher handles dropped");
                        self.commands_closed = true;
                        self.begin_drain();
                    }
                },
                _ = wait_until(alarm), if alarm.is_some() => {
                    trace!(partition = self.partition, "Flush alarm fired");
                    self.seal_open();
                }
                response = next_response(&mut self.session), if self.session.is_some() => {
                    match response {
                        Ok(response) => self.handle_response(response),
                        Err(status) => self.handle_stream_failure(status).await,
                    }
                }
                else => break,
            }
        }

        self.session = None;
        self.stream.close();
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!(topic = %self.topic, partition = self.partition, "Partition publisher stopped");
    }

    fn handle_command(&mut self, command: Command) {
        trace!(partition = self.partition, command = command.kind(), "Handling command");
        match command {
            Command::Publish(pending) => {
                if let Some(error) = &self.failure {
                    pending.fail(error.clone());
                } else if !self.accepting {
                    pending.fail(PublishError::Shutdown);
                } else {
                    let sealed = self.assembler.append(pending);
                    self.unsent.extend(sealed);
                }
            }
            Command::Flush(waiter) => {
                self.seal_open();
                let target = self.assembler.last_sequence();
                if target <= self.resolved_through {
                    let _ = waiter.send(());
                } else {
                    self.flush_waiters.push((target, waiter));
                }
            }
            Command::Shutdown(waiter) => {
                self.begin_drain();
                self.shutdown_waiters.push(waiter);
            }
        }
    }

    fn handle_response(&mut self, response: PublishResponse) {
        match response {
            PublishResponse::MessageResponse(ack) => match self.in_flight.pop_front() {
                Some(batch) => {
                    let sequence = batch.sequence();
                    match batch.resolve(self.partition as i64, ack.start_cursor) {
                        Ok(()) => {
                            self.resolved_through = sequence;
                            self.notify_flush_waiters();
                        }
                        Err(batch) => {
                            let len = batch.len();
                            self.in_flight.push_front(batch);
                            self.fail(PublishError::Protocol(format!(
                                "acknowledgement at offset {} overflows a batch of {} messages",
                                ack.start_cursor.offset, len
                            )));
                        }
                    }
                }
                None => self.fail(PublishError::Protocol(format!(
                    "acknowledgement at offset {} with no outstanding batch",
                    ack.start_cursor.offset
                ))),
            },
            PublishResponse::Initial(_) => self.fail(PublishError::Protocol(
                "initial response received on an active stream".to_string(),
            )),
        }
    }

    async fn handle_stream_failure(&mut self, status: Status) {
        self.session = None;
        if !self.stream.is_retryable(&status) {
            self.fail(PublishError::Stream(status));
            return;
        }

        // Unacknowledged batches go out again, first and in order.
        let requeued = self.in_flight.len();
        while let Some(batch) = self.in_flight.pop_back() {
            self.unsent.push_front(batch);
        }

        if !self.accepting {
            warn!(
                partition = self.partition,
                code = ?status.code(),
                outstanding = self.unsent.len(),
                "Publish stream failed while draining, abandoning outstanding batches"
            );
            self.resolve_all(PublishError::Stream(status));
            return;
        }

        debug!(partition = self.partition, requeued, "Resuming publish stream");
        self.connect(Some(status)).await;
    }

    async fn connect(&mut self, failure: Option<Status>) {
        let result = match failure {
            None => self.stream.connect().await,
            Some(status) => self.stream.resume(status).await,
        };
        match result {
            Ok(session) => self.session = Some(session),
            Err(StreamError::Permanent(status)) => self.fail(PublishError::Stream(status)),
            Err(StreamError::Cancelled) => {
                debug!(partition = self.partition, "Reconnect cancelled by shutdown");
                self.resolve_all(PublishError::Shutdown);
            }
        }
    }

    fn write_unsent(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        while let Some(batch) = self.unsent.pop_front() {
            if let Err(status) = session.write(batch.to_request()) {
                // The read side reports the broken stream.
                debug!(partition = self.partition, error = %status, "Batch write failed");
                self.unsent.push_front(batch);
                return;
            }
            trace!(
                partition = self.partition,
                sequence = batch.sequence(),
                batch_len = batch.len(),
                "Wrote batch"
            );
            self.in_flight.push_back(batch);
        }
    }

    fn begin_drain(&mut self) {
        if self.accepting {
            info!(partition = self.partition, "Draining partition publisher");
        }
        self.accepting = false;
        self.seal_open();
    }

    fn seal_open(&mut self) {
        if let Some(batch) = self.assembler.seal() {
            self.unsent.push_back(batch);
        }
    }

    fn has_outstanding(&self) -> bool {
        !self.assembler.is_empty() || !self.unsent.is_empty() || !self.in_flight.is_empty()
    }

    /// Fail the partition permanently.
    fn fail(&mut self, error: PublishError) {
        self.notifier.notify(&error);
        warn!(
            topic = %self.topic,
            partition = self.partition,
            error = %error,
            "Partition publisher failed permanently"
        );
        self.stream.close();
        self.resolve_all(error);
    }

    /// Resolve everything outstanding with `error`, oldest first, and reject
    /// later publishes with it.
    fn resolve_all(&mut self, error: PublishError) {
        self.session = None;
        self.seal_open();
        for batch in self.in_flight.drain(..).chain(self.unsent.drain(..)) {
            batch.fail(error.clone());
        }
        self.resolved_through = self.assembler.last_sequence();
        self.notify_flush_waiters();
        self.failure = Some(error);
    }

    fn notify_flush_waiters(&mut self) {
        let resolved = self.resolved_through;
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.flush_waiters)
            .into_iter()
            .partition(|(target, _)| *target <= resolved);
        self.flush_waiters = waiting;
        for (_, waiter) in done {
            let _ = waiter.send(());
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_response(session: &mut Option<StreamSession>) -> Result<PublishResponse, Status> {
    match session {
        Some(session) => session.read().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fault, InMemoryTransport};
    use pubsublite_core::MessageMetadata;
    use std::time::Duration;

    fn topic() -> TopicPath {
        "projects/p/locations/us-central1-a/topics/t".parse().unwrap()
    }

    fn settings(max_count: usize) -> PartitionSettings {
        PartitionSettings::new(
            BatchingOptions::default()
                .with_max_message_count(max_count)
                .with_flush_alarm_period(Duration::from_millis(5)),
            RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(10), 2.0),
        )
    }

    fn publisher(
        transport: &InMemoryTransport,
        partition: u32,
        max_count: usize,
    ) -> (PartitionPublisher, ExecutionContext) {
        let context = ExecutionContext::current().unwrap();
        let publisher = PartitionPublisher::new(
            topic(),
            partition,
            Arc::new(transport.clone()),
            settings(max_count),
            &context,
        );
        (publisher, context)
    }

    fn message(data: &str) -> PubSubMessage {
        PubSubMessage::new(data.to_string())
    }

    // ========================================================================
    // Acknowledgements
    // ========================================================================

    #[tokio::test]
    async fn test_acks_resolve_to_consecutive_offsets() {
        let transport = InMemoryTransport::new();
        let (publisher, _context) = publisher(&transport, 4, 1000);

        let handles: Vec<_> = (0..3).map(|i| publisher.publish(message(&i.to_string()))).collect();
        publisher.flush().await;

        let mut offsets = Vec::new();
        for handle in handles {
            let metadata = handle.await.unwrap();
            assert_eq!(metadata.partition, 4);
            offsets.push(metadata.offset());
        }
        assert_eq!(offsets, vec![0, 1, 2]);
        assert_eq!(transport.received_batches(4).len(), 1);
    }

    #[tokio::test]
    async fn test_batches_respect_message_count() {
        let transport = InMemoryTransport::new();
        let (publisher, _context) = publisher(&transport, 0, 2);

        let handles: Vec<_> = (0..5).map(|i| publisher.publish(message(&i.to_string()))).collect();
        publisher.flush().await;
        for handle in handles {
            handle.await.unwrap();
        }

        let lens: Vec<usize> = transport.received_batches(0).iter().map(Vec::len).collect();
        assert_eq!(lens, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_flush_alarm_sends_without_flush() {
        let transport = InMemoryTransport::new();
        let (publisher, _context) = publisher(&transport, 0, 1000);

        let metadata = publisher.publish(message("lonely")).await.unwrap();
        assert_eq!(metadata, MessageMetadata::new(0, 0));
    }

    // ========================================================================
    // Resume
    // ========================================================================

    #[tokio::test]
    async fn test_unacked_batch_is_resent_once_after_resume() {
        let transport = InMemoryTransport::new();
        transport.push_fault(Fault::FailAfterReceive(Status::unavailable("blip")));
        let (publisher, _context) = publisher(&transport, 0, 1000);

        let handle = publisher.publish(message("K"));
        publisher.flush().await;

        assert_eq!(handle.await.unwrap(), MessageMetadata::new(0, 0));
        assert_eq!(transport.received_batches(0).len(), 2);
        assert_eq!(transport.committed(0).len(), 1);
        assert_eq!(transport.streams_opened(), 2);
    }

    #[tokio::test]
    async fn test_resume_preserves_batch_order() {
        let transport = InMemoryTransport::new();
        transport.pause();
        let (publisher, _context) = publisher(&transport, 0, 1);

        let handles: Vec<_> = (0..4).map(|i| publisher.publish(message(&i.to_string()))).collect();
        // The server holds the first batch; the other three are written
        // behind it. Break the stream when the first one is released.
        while transport.received_batches(0).is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        transport.push_fault(Fault::FailAfterReceive(Status::aborted("moved")));
        transport.unpause();

        let mut offsets = Vec::new();
        for handle in handles {
            offsets.push(handle.await.unwrap().offset());
        }
        assert_eq!(offsets, vec![0, 1, 2, 3]);
        let committed: Vec<_> = transport
            .committed(0)
            .iter()
            .map(|m| m.data.clone())
            .collect();
        assert_eq!(committed, vec!["0", "1", "2", "3"]);
        assert_eq!(transport.received_batches(0).len(), 5);
    }

    #[tokio::test]
    async fn test_transient_open_failures_are_retried() {
        let transport = InMemoryTransport::new();
        transport.push_fault(Fault::RejectOpen(Status::unavailable("1")));
        transport.push_fault(Fault::RejectOpen(Status::resource_exhausted("2")));
        let (publisher, _context) = publisher(&transport, 0, 1000);

        assert!(publisher.publish(message("x")).await.is_ok());
        assert_eq!(transport.streams_opened(), 3);
    }

    // ========================================================================
    // Permanent failure
    // ========================================================================

    #[tokio::test]
    async fn test_permanent_failure_resolves_current_and_future_publishes() {
        let transport = InMemoryTransport::new();
        transport.fail_partition(0, Status::permission_denied("no"));
        let (publisher, _context) = publisher(&transport, 0, 1000);

        let first = publisher.publish(message("a")).await.unwrap_err();
        assert_eq!(first.code(), tonic::Code::PermissionDenied);

        let later = publisher.publish(message("b")).await.unwrap_err();
        assert!(matches!(later, PublishError::Stream(_)));
        publisher.flush().await;
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_ack_is_protocol_error() {
        let transport = InMemoryTransport::new();
        transport.push_fault(Fault::DuplicateAck);
        let (publisher, _context) = publisher(&transport, 0, 1000);

        assert!(publisher.publish(message("a")).await.is_ok());
        // The worker fails once it reads the duplicate.
        let next = publisher.publish(message("b")).await.unwrap_err();
        assert!(matches!(next, PublishError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_overflowing_ack_offset_is_protocol_error() {
        let transport = InMemoryTransport::new();
        transport.push_fault(Fault::AckAt(i64::MAX));
        let (publisher, _context) = publisher(&transport, 0, 1000);

        let first = publisher.publish(message("a"));
        let second = publisher.publish(message("b"));
        publisher.flush().await;

        assert!(matches!(first.await, Err(PublishError::Protocol(_))));
        assert!(matches!(second.await, Err(PublishError::Protocol(_))));
        let later = publisher.publish(message("c")).await.unwrap_err();
        assert!(matches!(later, PublishError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_second_initial_response_is_protocol_error() {
        let transport = InMemoryTransport::new();
        transport.push_fault(Fault::SecondInitial);
        let (publisher, _context) = publisher(&transport, 0, 1000);

        assert!(publisher.publish(message("a")).await.is_ok());
        let next = publisher.publish(message("b")).await.unwrap_err();
        assert!(matches!(next, PublishError::Protocol(_)));
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    #[tokio::test]
    async fn test_shutdown_drains_open_batch() {
        let transport = InMemoryTransport::new();
        let (publisher, context) = publisher(&transport, 0, 1000);

        let handles: Vec<_> = (0..3).map(|i| publisher.publish(message(&i.to_string()))).collect();
        publisher.shutdown().await;
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        assert!(matches!(
            publisher.publish(message("late")).await,
            Err(PublishError::Shutdown)
        ));
        context.shutdown().await;
        assert_eq!(context.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_unanswered_connect() {
        let transport = InMemoryTransport::new();
        transport.push_fault(Fault::IgnoreInitial);
        let (publisher, context) = publisher(&transport, 0, 1000);

        let handle = publisher.publish(message("a"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(3), publisher.shutdown())
            .await
            .expect("shutdown waited on a server that never answers");
        assert!(matches!(handle.await, Err(PublishError::Shutdown)));
        assert_eq!(transport.streams_opened(), 1);

        context.shutdown().await;
        assert_eq!(context.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_stream_broken_while_draining() {
        let transport = InMemoryTransport::new();
        transport.pause();
        let (publisher, _context) = publisher(&transport, 0, 1000);
        let publisher = Arc::new(publisher);

        // The flush alarm sends the batch; the server holds the ack.
        let handle = publisher.publish(message("a"));
        while transport.received_batches(0).is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let draining = Arc::clone(&publisher);
        let shutdown = tokio::spawn(async move { draining.shutdown().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        transport.push_fault(Fault::FailAfterReceive(Status::unavailable("gone")));
        transport.unpause();
        shutdown.await.unwrap();

        let err = handle.await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable);
        assert_eq!(transport.streams_opened(), 1);
    }
}
