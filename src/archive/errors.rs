//! Archive-specific error types
//!
//! - Structured error codes in TENANT_CATEGORY_NAME format
//! - Clear severity levels
//! - No silent failures (scratch cleanup is the one exception and never
//!   produces an error at all)

use std::fmt;
use std::io;

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation failed, nothing destructive happened yet
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Archive error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorCode {
    /// Scratch directory or container I/O failure
    TenantArchiveIo,
    /// Metadata document could not be read or written
    TenantArchiveMetadata,
    /// Container is not a readable tar / tar.gz
    TenantArchiveFormat,
    /// Operation called in the wrong lifecycle state
    TenantArchiveState,
}

impl ArchiveErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveErrorCode::TenantArchiveIo => "TENANT_ARCHIVE_IO",
            ArchiveErrorCode::TenantArchiveMetadata => "TENANT_ARCHIVE_METADATA",
            ArchiveErrorCode::TenantArchiveFormat => "TENANT_ARCHIVE_FORMAT",
            ArchiveErrorCode::TenantArchiveState => "TENANT_ARCHIVE_STATE",
        }
    }

    /// Returns the severity level for this error code
    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

impl fmt::Display for ArchiveErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Archive error with full context
#[derive(Debug)]
pub struct ArchiveError {
    code: ArchiveErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl ArchiveError {
    fn new(code: ArchiveErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Creates an I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(ArchiveErrorCode::TenantArchiveIo, message, Some(source))
    }

    /// Creates an I/O error at a specific path
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self::io_error(format!("I/O error at {}", path.display()), source)
    }

    /// Creates a metadata error
    pub fn metadata_failed(message: impl Into<String>) -> Self {
        Self::new(ArchiveErrorCode::TenantArchiveMetadata, message, None)
    }

    /// Creates a metadata error with source
    pub fn metadata_failed_with_source(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(ArchiveErrorCode::TenantArchiveMetadata, message, Some(source))
    }

    /// Creates a container format error
    pub fn invalid_format(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(ArchiveErrorCode::TenantArchiveFormat, message, Some(source))
    }

    /// Creates a lifecycle state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ArchiveErrorCode::TenantArchiveState, message, None)
    }

    /// Returns the error code
    pub fn code(&self) -> ArchiveErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity of this error
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;
