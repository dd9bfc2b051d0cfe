//! Acknowledgement metadata.
//!
//! Every successfully published message resolves to a `MessageMetadata`: the
//! partition it landed in and the offset the server assigned to it. The public
//! publish API returns this as an opaque `"partition:offset"` string. The text
//! form is not promised to be stable across library versions, but it always
//! parses back to the value it came from.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A position within a partition, assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub offset: i64,
}

impl Cursor {
    pub fn new(offset: i64) -> Self {
        Self { offset }
    }
}

/// Where a published message was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub partition: i64,
    pub cursor: Cursor,
}

impl MessageMetadata {
    pub fn new(partition: i64, offset: i64) -> Self {
        Self {
            partition,
            cursor: Cursor::new(offset),
        }
    }

    pub fn offset(&self) -> i64 {
        self.cursor.offset
    }
}

impl fmt::Display for MessageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.cursor.offset)
    }
}

impl FromStr for MessageMetadata {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            |reason: &str| Error::InvalidMessageMetadata(s.to_string(), reason.to_string());

        let (partition, offset) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected '<partition>:<offset>'"))?;
        let partition = parse_decimal(partition).ok_or_else(|| invalid("bad partition"))?;
        let offset = parse_decimal(offset).ok_or_else(|| invalid("bad offset"))?;
        Ok(MessageMetadata::new(partition, offset))
    }
}

// ASCII decimal with an optional leading '-', the form `Display` writes.
fn parse_decimal(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        let metadata = MessageMetadata::new(2389457, 945678234);
        assert_eq!(metadata.to_string(), "2389457:945678234");
    }

    #[test]
    fn test_parse() {
        let metadata: MessageMetadata = "2389457:945678234".parse().unwrap();
        assert_eq!(metadata, MessageMetadata::new(2389457, 945678234));
        assert_eq!(metadata.offset(), 945678234);
    }

    #[test]
    fn test_parse_rejects_non_numeric_partition() {
        let err = "q2432asdf:324572368".parse::<MessageMetadata>().unwrap_err();
        assert!(matches!(err, Error::InvalidMessageMetadata(..)));
    }

    #[test]
    fn test_parse_rejects_malformed_strings() {
        for input in ["", ":", "1:", ":1", "1", "1:2:3", "+1:2", "--1:2", "-:2", " 1:2", "1:2 "] {
            assert!(
                input.parse::<MessageMetadata>().is_err(),
                "expected '{}' to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_round_trip_edges() {
        for (p, o) in [(0, 0), (0, i64::MAX), (i64::MAX, 1), (7, 42), (-1, 5), (3, i64::MIN)] {
            let metadata = MessageMetadata::new(p, o);
            assert_eq!(metadata.to_string().parse::<MessageMetadata>().unwrap(), metadata);
        }
    }

    #[test]
    fn test_serde_json() {
        let metadata = MessageMetadata::new(3, 9);
        let json = serde_json::to_string(&metadata).unwrap();
        let back: MessageMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
