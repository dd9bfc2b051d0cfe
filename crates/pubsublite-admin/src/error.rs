//! Admin error types.
//!
//! ## Error Categories
//!
//! - `TopicNotFound` / `TopicAlreadyExists`: topic lifecycle conflicts
//! - `InvalidArgument`: bad partition counts or configs
//! - `PermissionDenied`: the caller may not see the topic
//! - `Rpc`: any other control-plane failure, carried as a `tonic::Status`
//!
//! `AdminError` converts to and from `tonic::Status` so a gRPC-backed client
//! and the in-memory one surface the same errors.

use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, AdminError>;

#[derive(Debug, Clone, Error)]
pub enum AdminError {
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Control plane RPC failed: {0}")]
    Rpc(Status),
}

impl AdminError {
    pub fn code(&self) -> Code {
        match self {
            AdminError::TopicNotFound(_) => Code::NotFound,
            AdminError::TopicAlreadyExists(_) => Code::AlreadyExists,
            AdminError::InvalidArgument(_) => Code::InvalidArgument,
            AdminError::PermissionDenied(_) => Code::PermissionDenied,
            AdminError::Rpc(status) => status.code(),
        }
    }
}

impl From<Status> for AdminError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::NotFound => AdminError::TopicNotFound(message),
            Code::AlreadyExists => AdminError::TopicAlreadyExists(message),
            Code::InvalidArgument => AdminError::InvalidArgument(message),
            Code::PermissionDenied => AdminError::PermissionDenied(message),
            _ => AdminError::Rpc(status),
        }
    }
}

impl From<AdminError> for Status {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Rpc(status) => status,
            other => Status::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_keeps_code() {
        let err = AdminError::from(Status::not_found("projects/p/locations/us-east1/topics/t"));
        assert!(matches!(err, AdminError::TopicNotFound(_)));

        let status: Status = err.into();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[test]
    fn test_unclassified_status_is_kept_as_rpc() {
        let err = AdminError::from(Status::unavailable("control plane down"));
        assert_eq!(err.code(), Code::Unavailable);
        assert!(matches!(err, AdminError::Rpc(_)));
    }
}
