/// Error types for the ConnectSphere client
use document_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Backend error, displayed verbatim
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("You must be signed in to do that.")]
    Unauthenticated,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Same action submitted again while the first is still running
    #[error("{0} is already in progress")]
    Busy(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
