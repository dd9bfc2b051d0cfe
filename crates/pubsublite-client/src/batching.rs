//! Batching for a single partition.
//!
//! Messages published to one partition are accumulated in an open batch and
//! sealed into an immutable `Batch` before they are written to the stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  publish()   │ PartitionPublisher
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  BatchAssembler              │ One per partition
//! │  - open: Vec<PendingMessage> │
//! │  - open_bytes: usize         │
//! │  - opened_at: Instant        │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ Seal when the count limit is reached (default 1000)
//!        ├─→ Seal before the byte limit would be exceeded (default 3.5 MiB)
//!        ├─→ Seal when the flush alarm fires (default 50ms after first message)
//!        ├─→ Seal on explicit flush()
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  Batch (sequence N)          │ Written to the stream, kept until acked
//! └──────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! Every sealed batch holds at most `max_message_count` messages and at most
//! `max_bytes` bytes. Both limits are clamped to the hard ceilings imposed by
//! the wire protocol. A single message larger than `max_bytes` can never fit,
//! so it is rejected on its own future instead of being batched.
//!
//! ## Thread Safety
//!
//! BatchAssembler is NOT thread-safe. It is owned by one partition worker task.

use crate::error::PublishError;
use crate::handle::{PublishHandle, ResultSender};
use pubsublite_core::{
    Cursor, MessageMetadata, MessagePublishRequest, PubSubMessage, PublishRequest,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Hard ceiling on messages per batch imposed by the publish protocol.
pub const MAX_BATCH_MESSAGE_COUNT: usize = 1000;

/// Hard ceiling on bytes per batch imposed by the publish protocol (3.5 MiB).
pub const MAX_BATCH_BYTES: usize = 3 * 1024 * 1024 + 512 * 1024;

/// Default flush alarm period.
pub const DEFAULT_FLUSH_ALARM_PERIOD: Duration = Duration::from_millis(50);

/// Batching thresholds.
///
/// Values above the protocol ceilings are clamped down; values of zero are
/// raised to one.
///
/// # Examples
///
/// ```ignore
/// // Low latency settings
/// let options = BatchingOptions::default()
///     .with_max_message_count(10)
///     .with_flush_alarm_period(Duration::from_millis(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchingOptions {
    max_message_count: usize,
    max_bytes: usize,
    flush_alarm_period: Duration,
}

impl Default for BatchingOptions {
    fn default() -> Self {
        Self {
            max_message_count: MAX_BATCH_MESSAGE_COUNT,
            max_bytes: MAX_BATCH_BYTES,
            flush_alarm_period: DEFAULT_FLUSH_ALARM_PERIOD,
        }
    }
}

impl BatchingOptions {
    pub fn new(max_message_count: usize, max_bytes: usize, flush_alarm_period: Duration) -> Self {
        Self::default()
            .with_max_message_count(max_message_count)
            .with_max_bytes(max_bytes)
            .with_flush_alarm_period(flush_alarm_period)
    }

    pub fn with_max_message_count(mut self, count: usize) -> Self {
        self.max_message_count = count.clamp(1, MAX_BATCH_MESSAGE_COUNT);
        self
    }

    pub fn with_max_bytes(mut self, bytes: usize) -> Self {
        self.max_bytes = bytes.clamp(1, MAX_BATCH_BYTES);
        self
    }

    pub fn with_flush_alarm_period(mut self, period: Duration) -> Self {
        self.flush_alarm_period = period;
        self
    }

    pub fn max_message_count(&self) -> usize {
        self.max_message_count
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn flush_alarm_period(&self) -> Duration {
        self.flush_alarm_period
    }
}

/// A message waiting for its acknowledgement.
#[derive(Debug)]
pub struct PendingMessage {
    message: PubSubMessage,
    size_bytes: usize,
    tx: ResultSender<MessageMetadata>,
}

impl PendingMessage {
    /// Pair a message with the handle its publisher will resolve.
    pub fn new(message: PubSubMessage) -> (Self, PublishHandle) {
        let (tx, handle) = PublishHandle::channel();
        let size_bytes = message.size_bytes();
        (
            Self {
                message,
                size_bytes,
                tx,
            },
            handle,
        )
    }

    pub fn message(&self) -> &PubSubMessage {
        &self.message
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn fail(self, error: PublishError) {
        // The caller may have dropped the handle, so it is ok if this fails.
        let _ = self.tx.send(Err(error));
    }

    fn resolve(self, metadata: MessageMetadata) {
        let _ = self.tx.send(Ok(metadata));
    }
}

/// An immutable, sealed batch.
///
/// Sequence numbers start at 1 and increase by one per sealed batch of a
/// partition, so they also order acknowledgements.
#[derive(Debug)]
pub struct Batch {
    sequence: u64,
    messages: Vec<PendingMessage>,
    size_bytes: usize,
}

impl Batch {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// The stream request carrying this batch. Payloads are `Bytes`, so this
    /// is cheap enough to rebuild on every (re)transmission.
    pub fn to_request(&self) -> PublishRequest {
        PublishRequest::MessagePublish(MessagePublishRequest {
            messages: self.messages.iter().map(|m| m.message.clone()).collect(),
        })
    }

    /// Resolve every message: message `i` is stored at `start_cursor + i`.
    ///
    /// Hands the batch back unresolved if the last offset would overflow.
    pub fn resolve(self, partition: i64, start_cursor: Cursor) -> Result<(), Batch> {
        let span = self.messages.len().saturating_sub(1) as i64;
        if start_cursor.offset.checked_add(span).is_none() {
            return Err(self);
        }
        trace!(
            partition,
            sequence = self.sequence,
            start_offset = start_cursor.offset,
            batch_len = self.messages.len(),
            "Resolving acknowledged batch"
        );
        for (index, pending) in self.messages.into_iter().enumerate() {
            pending.resolve(MessageMetadata::new(
                partition,
                start_cursor.offset + index as i64,
            ));
        }
        Ok(())
    }

    pub fn fail(self, error: PublishError) {
        for pending in self.messages {
            pending.fail(error.clone());
        }
    }
}

/// Accumulates messages for one partition and seals them into batches.
///
/// # Examples
///
/// ```ignore
/// let mut assembler = BatchAssembler::new(BatchingOptions::default().with_max_message_count(2));
///
/// let (m1, _h1) = PendingMessage::new(PubSubMessage::new("a"));
/// let (m2, _h2) = PendingMessage::new(PubSubMessage::new("b"));
/// assert!(assembler.append(m1).is_empty());
/// let sealed = assembler.append(m2);   // count limit reached
/// assert_eq!(sealed[0].len(), 2);
/// ```
#[derive(Debug)]
pub struct BatchAssembler {
    options: BatchingOptions,
    open: Vec<PendingMessage>,
    open_bytes: usize,

    /// Arrival time of the first message in the open batch.
    opened_at: Option<Instant>,

    last_sequence: u64,
}

impl BatchAssembler {
    pub fn new(options: BatchingOptions) -> Self {
        Self {
            open: Vec::with_capacity(options.max_message_count().min(64)),
            options,
            open_bytes: 0,
            opened_at: None,
            last_sequence: 0,
        }
    }

    pub fn options(&self) -> &BatchingOptions {
        &self.options
    }

    /// Add a message to the open batch.
    ///
    /// Returns the batches sealed as a consequence, oldest first: the
    /// previous open batch if this message would push it over the byte
    /// limit, and the new open batch if it reached either limit. A message
    /// that can never fit is failed with `InvalidMessage` and nothing is
    /// sealed.
    pub fn append(&mut self, pending: PendingMessage) -> Vec<Batch> {
        let mut sealed = Vec::new();
        let size = pending.size_bytes();

        if size > self.options.max_bytes {
            debug!(
                size_bytes = size,
                max_bytes = self.options.max_bytes,
                "Rejecting message larger than the batch byte limit"
            );
            pending.fail(PublishError::InvalidMessage(format!(
                "message of {} bytes exceeds the {} byte limit",
                size, self.options.max_bytes
            )));
            return sealed;
        }

        if !self.open.is_empty() && self.open_bytes + size > self.options.max_bytes {
            sealed.extend(self.seal());
        }

        if self.open.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.open_bytes += size;
        self.open.push(pending);
        trace!(
            open_len = self.open.len(),
            open_bytes = self.open_bytes,
            "Appended message to open batch"
        );

        if self.open.len() >= self.options.max_message_count
            || self.open_bytes >= self.options.max_bytes
        {
            sealed.extend(self.seal());
        }
        sealed
    }

    /// Seal the open batch, if it has any messages.
    pub fn seal(&mut self) -> Option<Batch> {
        if self.open.is_empty() {
            return None;
        }
        self.last_sequence += 1;
        let batch = Batch {
            sequence: self.last_sequence,
            messages: std::mem::take(&mut self.open),
            size_bytes: std::mem::take(&mut self.open_bytes),
        };
        self.opened_at = None;
        debug!(
            sequence = batch.sequence,
            batch_len = batch.len(),
            size_bytes = batch.size_bytes,
            "Sealed batch"
        );
        Some(batch)
    }

    /// When the flush alarm fires for the open batch, if one is open.
    pub fn alarm_deadline(&self) -> Option<Instant> {
        self.opened_at
            .map(|opened| opened + self.options.flush_alarm_period)
    }

    /// Sequence of the most recently sealed batch (0 if none yet).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.open_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(data: &str) -> (PendingMessage, PublishHandle) {
        PendingMessage::new(PubSubMessage::new(data.to_string()))
    }

    #[test]
    fn test_options_are_clamped_to_protocol_ceilings() {
        let options = BatchingOptions::new(5000, usize::MAX, Duration::from_millis(10));
        assert_eq!(options.max_message_count(), MAX_BATCH_MESSAGE_COUNT);
        assert_eq!(options.max_bytes(), MAX_BATCH_BYTES);
        assert_eq!(MAX_BATCH_BYTES, 3_670_016);

        let zero = BatchingOptions::new(0, 0, Duration::ZERO);
        assert_eq!(zero.max_message_count(), 1);
        assert_eq!(zero.max_bytes(), 1);
    }

    #[test]
    fn test_seals_on_message_count() {
        let mut assembler =
            BatchAssembler::new(BatchingOptions::default().with_max_message_count(2));
        let mut sealed = Vec::new();
        let mut handles = Vec::new();
        for i in 0..5 {
            let (m, h) = pending(&format!("m{}", i));
            handles.push(h);
            sealed.extend(assembler.append(m));
        }
        sealed.extend(assembler.seal());

        let lens: Vec<usize> = sealed.iter().map(Batch::len).collect();
        assert_eq!(lens, vec![2, 2, 1]);
        let sequences: Vec<u64> = sealed.iter().map(Batch::sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_seals_previous_batch_before_byte_limit_is_exceeded() {
        let mut assembler = BatchAssembler::new(BatchingOptions::default().with_max_bytes(10));

        let (a, _ha) = pending("aaaa");
        let (b, _hb) = pending("bbbb");
        let (c, _hc) = pending("cccc");
        assert!(assembler.append(a).is_empty());
        assert!(assembler.append(b).is_empty());
        assert_eq!(assembler.size_bytes(), 8);

        // 8 + 4 > 10: the open batch is sealed first
        let sealed = assembler.append(c);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), 2);
        assert_eq!(sealed[0].size_bytes(), 8);
        assert_eq!(assembler.len(), 1);
    }

    #[test]
    fn test_seals_when_byte_limit_is_hit_exactly() {
        let mut assembler = BatchAssembler::new(BatchingOptions::default().with_max_bytes(8));
        let (a, _ha) = pending("aaaa");
        let (b, _hb) = pending("bbbb");
        assert!(assembler.append(a).is_empty());
        let sealed = assembler.append(b);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].size_bytes(), 8);
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected_alone() {
        let mut assembler = BatchAssembler::new(BatchingOptions::default().with_max_bytes(4));
        let (small, _hs) = pending("ab");
        let (big, hb) = pending("too big");

        assert!(assembler.append(small).is_empty());
        assert!(assembler.append(big).is_empty());
        assert_eq!(assembler.len(), 1);
        assert!(matches!(hb.await, Err(PublishError::InvalidMessage(_))));
    }

    #[test]
    fn test_batch_invariants_hold_for_mixed_sizes() {
        let options = BatchingOptions::default()
            .with_max_message_count(7)
            .with_max_bytes(100);
        let mut assembler = BatchAssembler::new(options.clone());
        let mut sealed = Vec::new();
        let mut handles = Vec::new();
        for i in 0..200 {
            let (m, h) = pending(&"x".repeat(1 + (i * 37) % 60));
            handles.push(h);
            sealed.extend(assembler.append(m));
        }
        sealed.extend(assembler.seal());

        let total: usize = sealed.iter().map(Batch::len).sum();
        assert_eq!(total, 200);
        for batch in &sealed {
            assert!(batch.len() <= options.max_message_count());
            assert!(batch.size_bytes() <= options.max_bytes());
        }
    }

    #[tokio::test]
    async fn test_resolve_assigns_consecutive_offsets() {
        let mut assembler = BatchAssembler::new(BatchingOptions::default());
        let (a, ha) = pending("a");
        let (b, hb) = pending("b");
        assembler.append(a);
        assembler.append(b);

        let batch = assembler.seal().unwrap();
        match batch.to_request() {
            PublishRequest::MessagePublish(req) => assert_eq!(req.messages.len(), 2),
            other => panic!("unexpected request {:?}", other),
        }
        batch.resolve(3, Cursor::new(40)).unwrap();

        assert_eq!(ha.await.unwrap(), MessageMetadata::new(3, 40));
        assert_eq!(hb.await.unwrap(), MessageMetadata::new(3, 41));
    }

    #[tokio::test]
    async fn test_resolve_refuses_overflowing_offsets() {
        let mut assembler = BatchAssembler::new(BatchingOptions::default());
        let (a, _ha) = pending("a");
        let (b, _hb) = pending("b");
        assembler.append(a);
        assembler.append(b);

        let batch = assembler.seal().unwrap();
        let batch = batch.resolve(0, Cursor::new(i64::MAX)).unwrap_err();
        assert_eq!(batch.len(), 2);

        // The last message may sit exactly at the maximum offset.
        batch.resolve(0, Cursor::new(i64::MAX - 1)).unwrap();

        let (c, hc) = pending("c");
        assembler.append(c);
        assembler.seal().unwrap().resolve(0, Cursor::new(i64::MAX)).unwrap();
        assert_eq!(hc.await.unwrap(), MessageMetadata::new(0, i64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_alarm_deadline_tracks_first_message() {
        let period = Duration::from_millis(30);
        let mut assembler =
            BatchAssembler::new(BatchingOptions::default().with_flush_alarm_period(period));
        assert!(assembler.alarm_deadline().is_none());

        let start = Instant::now();
        let (a, _ha) = pending("a");
        assembler.append(a);
        tokio::time::advance(Duration::from_millis(10)).await;
        let (b, _hb) = pending("b");
        assembler.append(b);

        assert_eq!(assembler.alarm_deadline(), Some(start + period));
        assembler.seal();
        assert!(assembler.alarm_deadline().is_none());
    }

    #[test]
    fn test_seal_empty_is_none() {
        let mut assembler = BatchAssembler::new(BatchingOptions::default());
        assert!(assembler.seal().is_none());
        assert_eq!(assembler.last_sequence(), 0);
    }
}
