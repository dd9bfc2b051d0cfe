//! Wire-level message type.
//!
//! `PubSubMessage` is what travels on the publish stream. Payloads are held as
//! `Bytes` so batches can be cloned for retransmission without copying data.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values of one attribute. Pub/Sub Lite attributes are multi-valued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValues {
    pub values: Vec<Bytes>,
}

impl AttributeValues {
    pub fn single(value: impl Into<Bytes>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }
}

/// A message as published on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubMessage {
    /// Routing key. Messages with the same non-empty key go to the same
    /// partition.
    pub key: Bytes,

    /// Payload.
    pub data: Bytes,

    /// Attributes, ordered by name.
    pub attributes: BTreeMap<String, AttributeValues>,

    /// Optional user-supplied event time.
    pub event_time: Option<DateTime<Utc>>,
}

impl PubSubMessage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .values
            .push(value.into());
        self
    }

    pub fn with_event_time(mut self, event_time: DateTime<Utc>) -> Self {
        self.event_time = Some(event_time);
        self
    }

    /// Estimated encoded size in bytes.
    ///
    /// This is not the exact wire length; it counts key, data, attribute names
    /// and values, plus 12 bytes for an event time when present.
    pub fn size_bytes(&self) -> usize {
        let attributes: usize = self
            .attributes
            .iter()
            .map(|(name, values)| name.len() + values.values.iter().map(Bytes::len).sum::<usize>())
            .sum();
        let event_time = if self.event_time.is_some() { 12 } else { 0 };
        self.key.len() + self.data.len() + attributes + event_time
    }
}
