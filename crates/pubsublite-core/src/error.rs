//! Error types for the core data model.
//!
//! Everything in this crate is pure parsing and validation, so the only
//! failure class is a malformed input. Callers that expose a status code map
//! these to `InvalidArgument`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A topic path did not match `projects/*/locations/*/topics/*`.
    #[error("Invalid topic path '{0}': {1}")]
    InvalidTopicPath(String, String),

    /// A location was neither a region nor a zone.
    #[error("Invalid location '{0}'")]
    InvalidLocation(String),

    /// An acknowledgement string was not `<partition>:<offset>`.
    #[error("Invalid message metadata '{0}': {1}")]
    InvalidMessageMetadata(String, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
