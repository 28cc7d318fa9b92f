//! Error types for docstore

use thiserror::Error;

/// Result type alias for docstore operations
pub type Result<T> = std::result::Result<T, DocStoreError>;

/// Server error code for a rejected login
#[cfg(feature = "mongodb-errors")]
const AUTHENTICATION_FAILED: i32 = 18;

/// Server error code for an operation the authenticated user may not run
#[cfg(feature = "mongodb-errors")]
const UNAUTHORIZED: i32 = 13;

/// Server error code for a write rejected by a collection validator
#[cfg(feature = "mongodb-errors")]
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

/// Unified error type for all docstore operations
#[derive(Error, Debug, Clone)]
pub enum DocStoreError {
    /// Server unreachable or did not answer within the connect timeout
    #[error("Connection error: {0}")]
    Connection(String),

    /// Credentials rejected by the server
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Record shape, filter or name rejected before (or by) the server
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation attempted on a handle that was already closed
    #[error("Connection handle is closed")]
    ClosedHandle,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl DocStoreError {
    /// Returns true if this error is worth retrying.
    ///
    /// Only connection failures qualify; everything else is surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocStoreError::Connection(_))
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DocStoreError::Connection(_) => "connection",
            DocStoreError::Auth(_) => "auth",
            DocStoreError::Validation(_) => "validation",
            DocStoreError::ClosedHandle => "closed_handle",
            DocStoreError::Config(_) => "config",
            DocStoreError::Database(_) => "database",
            DocStoreError::Query(_) => "query",
            DocStoreError::Serialization(_) => "serialization",
            DocStoreError::Deserialization(_) => "deserialization",
        }
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for DocStoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match err.kind.as_ref() {
            ErrorKind::Authentication { .. } => DocStoreError::Auth(err.to_string()),
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => {
                DocStoreError::Connection(err.to_string())
            }
            ErrorKind::Command(cmd) if cmd.code == AUTHENTICATION_FAILED || cmd.code == UNAUTHORIZED => {
                DocStoreError::Auth(err.to_string())
            }
            ErrorKind::Write(WriteFailure::WriteError(write))
                if write.code == DOCUMENT_VALIDATION_FAILURE =>
            {
                DocStoreError::Validation(err.to_string())
            }
            ErrorKind::InvalidArgument { .. } => DocStoreError::Query(err.to_string()),
            ErrorKind::BsonSerialization(_) => DocStoreError::Serialization(err.to_string()),
            ErrorKind::BsonDeserialization(_) => DocStoreError::Deserialization(err.to_string()),
            _ => DocStoreError::Database(err.to_string()),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for DocStoreError {
    fn from(err: bson::ser::Error) -> Self {
        DocStoreError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for DocStoreError {
    fn from(err: bson::de::Error) -> Self {
        DocStoreError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let err = DocStoreError::Connection("timeout".to_string());
        assert_eq!(err.to_string(), "Connection error: timeout");
    }

    #[test]
    fn test_error_display_auth() {
        let err = DocStoreError::Auth("bad password".to_string());
        assert_eq!(err.to_string(), "Authentication error: bad password");
    }

    #[test]
    fn test_error_display_validation() {
        let err = DocStoreError::Validation("field required".to_string());
        assert_eq!(err.to_string(), "Validation error: field required");
    }

    #[test]
    fn test_error_display_closed_handle() {
        assert_eq!(
            DocStoreError::ClosedHandle.to_string(),
            "Connection handle is closed"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(DocStoreError::Connection("test".to_string()).is_retryable());
        assert!(!DocStoreError::Auth("test".to_string()).is_retryable());
        assert!(!DocStoreError::Validation("test".to_string()).is_retryable());
        assert!(!DocStoreError::ClosedHandle.is_retryable());
        assert!(!DocStoreError::Database("test".to_string()).is_retryable());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(DocStoreError::Connection(String::new()).kind(), "connection");
        assert_eq!(DocStoreError::Auth(String::new()).kind(), "auth");
        assert_eq!(DocStoreError::ClosedHandle.kind(), "closed_handle");
    }

    #[test]
    fn test_result_type_err() {
        let result: Result<i32> = Err(DocStoreError::Query("failed".to_string()));
        assert!(result.is_err());
    }
}
