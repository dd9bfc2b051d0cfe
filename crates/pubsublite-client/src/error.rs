//! Error types for the publisher.
//!
//! Two error types cover the two ways a caller observes failure:
//!
//! - `ClientError` is returned synchronously by constructors and
//!   configuration: control-plane lookups, invalid options.
//! - `PublishError` resolves an individual publish future. One stream failure
//!   resolves many futures at once, so it is `Clone`.
//!
//! ## Error Handling Strategy
//!
//! - **Per-message**: `InvalidMessage` never affects other in-flight messages
//! - **Transient transport errors**: never surface here; the resumable stream
//!   retries them indefinitely
//! - **Permanent transport errors**: `Stream` resolves every outstanding and
//!   future message of the affected partition
//! - **Shutdown**: `Shutdown` resolves whatever was not acknowledged
//!
//! ## Examples
//!
//! ```ignore
//! match connection.publish(message).await {
//!     Ok(ack) => println!("stored at {}", ack),
//!     Err(PublishError::InvalidMessage(reason)) => eprintln!("rejected: {}", reason),
//!     Err(e) => eprintln!("publish failed: {}", e),
//! }
//! ```

use pubsublite_admin::AdminError;
use thiserror::Error;
use tonic::{Code, Status};

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The control plane refused or failed the partition count lookup.
    ///
    /// Raised only at construction; no background work has been started.
    #[error("Admin error: {0}")]
    Admin(#[from] AdminError),

    /// Invalid publisher configuration (missing collaborator, bad env value).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No tokio runtime was available to run background tasks.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<pubsublite_core::Error> for ClientError {
    fn from(e: pubsublite_core::Error) -> Self {
        ClientError::InvalidArgument(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The message was rejected before reaching the network.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The partition stream failed with a non-retryable status.
    #[error("Publish stream failed: {0}")]
    Stream(Status),

    /// The server broke the publish stream protocol.
    #[error("Publish stream protocol violation: {0}")]
    Protocol(String),

    /// The publisher shut down before the message was acknowledged.
    #[error("Publisher shut down")]
    Shutdown,
}

impl PublishError {
    /// Status code matching this error, for callers that report gRPC-style
    /// codes.
    pub fn code(&self) -> Code {
        match self {
            PublishError::InvalidMessage(_) => Code::InvalidArgument,
            PublishError::Stream(status) => status.code(),
            PublishError::Protocol(_) => Code::FailedPrecondition,
            PublishError::Shutdown => Code::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_codes() {
        assert_eq!(
            PublishError::InvalidMessage("x".into()).code(),
            Code::InvalidArgument
        );
        assert_eq!(
            PublishError::Stream(Status::permission_denied("no")).code(),
            Code::PermissionDenied
        );
        assert_eq!(PublishError::Shutdown.code(), Code::Cancelled);
    }

    #[test]
    fn test_admin_error_converts() {
        let err: ClientError = AdminError::TopicNotFound("t".into()).into();
        assert!(matches!(err, ClientError::Admin(AdminError::TopicNotFound(_))));
        assert!(err.to_string().contains("Topic not found"));
    }
}
