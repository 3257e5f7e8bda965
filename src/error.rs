//! Error types for the public [`crate::router`] boundary. Background
//! collaborators (stabilizer, replicator, discoverer, timer) use `anyhow`
//! internally and just log failures — only the client-facing Router and the
//! gRPC service surface typed errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("no reachable replica for key: {0}")]
    Unavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<RouterError> for tonic::Status {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::NotFound(msg) => tonic::Status::not_found(msg),
            RouterError::Internal(msg) => tonic::Status::internal(msg),
            RouterError::Unavailable(msg) => tonic::Status::unavailable(msg),
            RouterError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}

impl From<tonic::Status> for RouterError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::NotFound => RouterError::NotFound(status.message().to_string()),
            tonic::Code::InvalidArgument => {
                RouterError::InvalidArgument(status.message().to_string())
            }
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => {
                RouterError::Unavailable(status.message().to_string())
            }
            _ => RouterError::Internal(status.message().to_string()),
        }
    }
}

impl From<tonic::transport::Error> for RouterError {
    fn from(err: tonic::transport::Error) -> Self {
        RouterError::Unavailable(err.to_string())
    }
}
