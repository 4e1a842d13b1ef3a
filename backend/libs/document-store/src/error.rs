//! Error types for backend operations

use thiserror::Error;

/// Errors surfaced by the document store, blob storage and auth provider.
///
/// Messages are shown to users verbatim, so they read like the backend's own
/// wording rather than like internal diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Update or read of a document that does not exist
    #[error("No document to update: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Blob key with no stored object
    #[error("Object '{0}' does not exist. (storage/object-not-found)")]
    ObjectNotFound(String),

    /// Malformed request (bad collection name, non-object payload, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend rejected or failed the operation
    #[error("{0}")]
    Unavailable(String),

    /// Live query terminated by the backend
    #[error("Listen stream closed: {0}")]
    Subscription(String),

    /// Auth provider error in `auth/<code>` form
    #[error("{message} (auth/{code})")]
    Auth { code: String, message: String },

    /// Document payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn auth(code: &str, message: impl Into<String>) -> Self {
        StoreError::Auth {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Auth error code, if this is an auth error
    pub fn auth_code(&self) -> Option<&str> {
        match self {
            StoreError::Auth { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::not_found("posts", "abc");
        assert_eq!(err.to_string(), "No document to update: posts/abc");

        let err = StoreError::auth("weak-password", "Password should be at least 6 characters");
        assert_eq!(
            err.to_string(),
            "Password should be at least 6 characters (auth/weak-password)"
        );
        assert_eq!(err.auth_code(), Some("weak-password"));
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());

        let err: StoreError = json_err.unwrap_err().into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
