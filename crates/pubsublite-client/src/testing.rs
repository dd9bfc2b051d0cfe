//! In-process publish server for tests and demos.
//!
//! `InMemoryTransport` implements `PublishTransport` by spawning one server
//! task per opened stream. The server follows the publish protocol: it waits
//! for the initial request, answers it, then appends every batch to an
//! in-memory partition log and acknowledges it with the offset of its first
//! message. Offsets are per partition and start at 0.
//!
//! Tests steer it with:
//!
//! - `push_fault`: one-shot faults consumed in order as the matching point
//!   of the protocol is reached
//! - `fail_partition`: a standing status returned to every initial request
//!   for a partition
//! - `pause` / `unpause`: hold acknowledgements back, so batches stay in
//!   flight
//!
//! and inspect it with `received_batches` (every batch that arrived,
//! including retransmissions) and `committed` (what was acknowledged).

use crate::transport::{PublishTransport, RequestStream, ResponseStream};
use async_trait::async_trait;
use futures::StreamExt;
use pubsublite_core::{
    Cursor, InitialPublishResponse, MessagePublishResponse, PubSubMessage, PublishRequest,
    PublishResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;
use tracing::trace;

#[derive(Debug, Clone)]
pub enum Fault {
    /// `open_stream` fails with the status.
    RejectOpen(Status),

    /// The initial request is answered with the status.
    FailInitial(Status),

    /// The initial request is never answered. The server holds the stream
    /// until the client drops it.
    IgnoreInitial,

    /// The next batch is received but not committed, and the stream fails
    /// with the status.
    FailAfterReceive(Status),

    /// The next batch is acknowledged twice.
    DuplicateAck,

    /// A second initial response is sent after the next batch is
    /// acknowledged.
    SecondInitial,

    /// The next batch is committed but acknowledged at the given offset.
    AckAt(i64),
}

impl Fault {
    fn point(&self) -> FaultPoint {
        match self {
            Fault::RejectOpen(_) => FaultPoint::Open,
            Fault::FailInitial(_) | Fault::IgnoreInitial => FaultPoint::Initial,
            Fault::FailAfterReceive(_)
            | Fault::DuplicateAck
            | Fault::SecondInitial
            | Fault::AckAt(_) => FaultPoint::Batch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultPoint {
    Open,
    Initial,
    Batch,
}

#[derive(Debug, Default)]
struct PartitionLog {
    received: Vec<Vec<PubSubMessage>>,
    committed: Vec<PubSubMessage>,
}

#[derive(Debug, Default)]
struct ServerState {
    partitions: HashMap<i64, PartitionLog>,
    faults: VecDeque<Fault>,
    failed_partitions: HashMap<i64, Status>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<ServerState>,
    streams_opened: AtomicUsize,
    paused: watch::Sender<bool>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ServerState> {
        // A panicking test thread must not hide the server state from others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_fault(&self, point: FaultPoint) -> Option<Fault> {
        let mut state = self.state();
        if state.faults.front().map(Fault::point) == Some(point) {
            state.faults.pop_front()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ServerState::default()),
                streams_opened: AtomicUsize::new(0),
                paused,
            }),
        }
    }

    pub fn push_fault(&self, fault: Fault) {
        self.inner.state().faults.push_back(fault);
    }

    /// Answer every initial request for `partition` with `status`.
    pub fn fail_partition(&self, partition: i64, status: Status) {
        self.inner.state().failed_partitions.insert(partition, status);
    }

    /// Hold acknowledgements until `unpause`. Batches still arrive.
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    pub fn unpause(&self) {
        self.inner.paused.send_replace(false);
    }

    /// Number of `open_stream` calls, including rejected ones.
    pub fn streams_opened(&self) -> usize {
        self.inner.streams_opened.load(Ordering::SeqCst)
    }

    /// Every batch received on `partition`, in arrival order.
    pub fn received_batches(&self, partition: i64) -> Vec<Vec<PubSubMessage>> {
        self.inner
            .state()
            .partitions
            .get(&partition)
            .map(|log| log.received.clone())
            .unwrap_or_default()
    }

    /// Messages acknowledged on `partition`; index `i` has offset `i`.
    pub fn committed(&self, partition: i64) -> Vec<PubSubMessage> {
        self.inner
            .state()
            .partitions
            .get(&partition)
            .map(|log| log.committed.clone())
            .unwrap_or_default()
    }

    async fn serve(
        inner: Arc<Inner>,
        mut requests: RequestStream,
        responses: mpsc::UnboundedSender<Result<PublishResponse, Status>>,
    ) {
        let partition = match requests.next().await {
            Some(PublishRequest::Initial(initial)) => initial.partition,
            Some(PublishRequest::MessagePublish(_)) => {
                let _ = responses.send(Err(Status::invalid_argument(
                    "first request must be an initial request",
                )));
                return;
            }
            None => return,
        };

        let standing = inner.state().failed_partitions.get(&partition).cloned();
        if let Some(status) = standing {
            let _ = responses.send(Err(status));
            return;
        }
        match inner.take_fault(FaultPoint::Initial) {
            Some(Fault::FailInitial(status)) => {
                let _ = responses.send(Err(status));
                return;
            }
            Some(Fault::IgnoreInitial) => {
                while requests.next().await.is_some() {}
                return;
            }
            _ => {}
        }
        if responses
            .send(Ok(PublishResponse::Initial(InitialPublishResponse {})))
            .is_err()
        {
            return;
        }

        let mut paused = inner.paused.subscribe();
        while let Some(request) = requests.next().await {
            let batch = match request {
                PublishRequest::MessagePublish(batch) => batch,
                PublishRequest::Initial(_) => {
                    let _ = responses.send(Err(Status::invalid_argument(
                        "initial request sent twice",
                    )));
                    return;
                }
            };

            inner.state()
                .partitions
                .entry(partition)
                .or_default()
                .received
                .push(batch.messages.clone());
            trace!(partition, batch_len = batch.messages.len(), "Server received batch");

            if paused.wait_for(|p| !*p).await.is_err() {
                return;
            }

            let fault = inner.take_fault(FaultPoint::Batch);
            if let Some(Fault::FailAfterReceive(status)) = fault {
                let _ = responses.send(Err(status));
                return;
            }

            let start = {
                let mut state = inner.state();
                let log = state.partitions.entry(partition).or_default();
                let start = log.committed.len() as i64;
                log.committed.extend(batch.messages);
                start
            };
            let start = match fault {
                Some(Fault::AckAt(offset)) => offset,
                _ => start,
            };
            let ack = PublishResponse::MessageResponse(MessagePublishResponse {
                start_cursor: Cursor::new(start),
            });
            if responses.send(Ok(ack.clone())).is_err() {
                return;
            }
            match fault {
                Some(Fault::DuplicateAck) => {
                    let _ = responses.send(Ok(ack));
                }
                Some(Fault::SecondInitial) => {
                    let _ = responses.send(Ok(PublishResponse::Initial(InitialPublishResponse {})));
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl PublishTransport for InMemoryTransport {
    async fn open_stream(&self, requests: RequestStream) -> Result<ResponseStream, Status> {
        self.inner.streams_opened.fetch_add(1, Ordering::SeqCst);
        if let Some(Fault::RejectOpen(status)) = self.inner.take_fault(FaultPoint::Open) {
            return Err(status);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::serve(Arc::clone(&self.inner), requests, tx));
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
