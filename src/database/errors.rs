//! Data layer errors

use std::io;

use thiserror::Error;

/// Result type for data layer operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Data layer and external tool errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    // Identifier errors
    #[error("Invalid namespace identifier: {0:?}")]
    InvalidNamespace(String),

    #[error("Namespace does not exist: {0}")]
    NamespaceNotFound(String),

    // Connection errors
    #[error("Connection parameters requested before the connection was initialized")]
    NotInitialized,

    // External process errors
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Unexpected query result: {0}")]
    UnexpectedResult(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DatabaseError {
    /// True when an external tool ran and reported failure
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, DatabaseError::ToolFailed { .. })
    }
}
