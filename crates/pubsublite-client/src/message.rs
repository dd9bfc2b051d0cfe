//! Public message representation and its conversion to the wire message.

use crate::error::PublishError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pubsublite_core::PubSubMessage;
use std::collections::HashMap;

/// Reserved attribute carrying the event time of a message, in RFC 3339.
pub const EVENT_TIME_ATTRIBUTE: &str = "x-goog-pubsublite-event-time";

/// A message as callers publish it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub data: Bytes,
    pub attributes: HashMap<String, String>,

    /// Messages sharing a non-empty ordering key go to the same partition
    /// and are acknowledged in publish order.
    pub ordering_key: String,
}

impl Message {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_ordering_key(mut self, key: impl Into<String>) -> Self {
        self.ordering_key = key.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Default conversion from `Message` to the wire message.
///
/// The ordering key becomes the routing key, each attribute becomes a
/// single-valued attribute, and the reserved event time attribute is moved
/// into `event_time`. A malformed event time rejects the message.
pub fn default_transformer(message: Message) -> Result<PubSubMessage, PublishError> {
    let mut wire = PubSubMessage::new(message.data).with_key(message.ordering_key.into_bytes());
    for (name, value) in message.attributes {
        if name == EVENT_TIME_ATTRIBUTE {
            let event_time = DateTime::parse_from_rfc3339(&value).map_err(|e| {
                PublishError::InvalidMessage(format!(
                    "attribute {} is not an RFC 3339 timestamp ('{}'): {}",
                    EVENT_TIME_ATTRIBUTE, value, e
                ))
            })?;
            wire = wire.with_event_time(event_time.with_timezone(&Utc));
        } else {
            wire = wire.with_attribute(name, value.into_bytes());
        }
    }
    Ok(wire)
}
