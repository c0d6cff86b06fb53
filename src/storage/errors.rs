//! # Storage Errors

use thiserror::Error;

use crate::database::DatabaseError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object store and media storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    // Object errors
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    // Validation errors
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // Transport errors
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Invalid response from object store: {0}")]
    InvalidResponse(String),

    // I/O errors
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::IoError(e.to_string())
    }
}

impl From<DatabaseError> for StorageError {
    fn from(e: DatabaseError) -> Self {
        StorageError::TransferFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            StorageError::ObjectNotFound("s3://b/k".into()).to_string(),
            "Object not found: s3://b/k"
        );
        assert_eq!(
            StorageError::InvalidPath("../etc".into()).to_string(),
            "Invalid path: ../etc"
        );
    }

    #[test]
    fn test_tool_failure_becomes_transfer_failure() {
        let err: StorageError = DatabaseError::ToolFailed {
            program: "aws".into(),
            status: "exit status: 255".into(),
            stderr: "An error occurred (NoSuchBucket)".into(),
        }
        .into();

        assert!(matches!(err, StorageError::TransferFailed(ref m) if m.contains("NoSuchBucket")));
    }
}
