//! Command-level error types
//!
//! - Structured error codes in TENANT_CATEGORY_NAME format
//! - Every error names the phase that failed, so a fatal path can be
//!   found in the log by phase
//! - Errors from lower layers are carried as the source, unchanged

use std::error::Error as StdError;
use std::fmt;

use crate::archive::ArchiveError;
use crate::database::DatabaseError;
use crate::storage::StorageError;

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation failed
    Error,
    /// Recovery failed, tenant data needs operator attention
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Step of a backup, restore or rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Select,
    Fetch,
    Extract,
    Validate,
    Rewrite,
    Dump,
    Media,
    Metadata,
    Archive,
    Upload,
    Drop,
    Load,
    Bookkeeping,
    Recovery,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Select => "select",
            Phase::Fetch => "fetch",
            Phase::Extract => "extract",
            Phase::Validate => "validate",
            Phase::Rewrite => "rewrite",
            Phase::Dump => "dump",
            Phase::Media => "media",
            Phase::Metadata => "metadata",
            Phase::Archive => "archive",
            Phase::Upload => "upload",
            Phase::Drop => "drop",
            Phase::Load => "load",
            Phase::Bookkeeping => "bookkeeping",
            Phase::Recovery => "recovery",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorCode {
    /// Caller or input error, raised before anything destructive
    TenantCommandUsage,
    /// Archive manager failure
    TenantCommandArchive,
    /// Rewriting the dump failed
    TenantCommandRewrite,
    /// Data layer or dump/load tool failure
    TenantCommandDatabase,
    /// Object store or media transfer failure
    TenantCommandStorage,
    /// Load failed and the recovery snapshot was reloaded
    TenantCommandRolledBack,
    /// Recovery snapshot could not be reloaded
    TenantCommandRecoveryFailed,
}

impl CommandErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandErrorCode::TenantCommandUsage => "TENANT_COMMAND_USAGE",
            CommandErrorCode::TenantCommandArchive => "TENANT_COMMAND_ARCHIVE",
            CommandErrorCode::TenantCommandRewrite => "TENANT_COMMAND_REWRITE",
            CommandErrorCode::TenantCommandDatabase => "TENANT_COMMAND_DATABASE",
            CommandErrorCode::TenantCommandStorage => "TENANT_COMMAND_STORAGE",
            CommandErrorCode::TenantCommandRolledBack => "TENANT_COMMAND_ROLLED_BACK",
            CommandErrorCode::TenantCommandRecoveryFailed => "TENANT_COMMAND_RECOVERY_FAILED",
        }
    }

    /// Returns the severity level for this error code
    pub fn severity(&self) -> Severity {
        match self {
            CommandErrorCode::TenantCommandRecoveryFailed => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for CommandErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Command error with full context
#[derive(Debug)]
pub struct CommandError {
    code: CommandErrorCode,
    phase: Phase,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl CommandError {
    fn new(
        code: CommandErrorCode,
        phase: Phase,
        message: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            code,
            phase,
            message: message.into(),
            source,
        }
    }

    fn wrap<E: StdError + Send + Sync + 'static>(
        code: CommandErrorCode,
        phase: Phase,
        source: E,
    ) -> Self {
        Self::new(code, phase, source.to_string(), Some(Box::new(source)))
    }

    /// Creates a user-facing error
    pub fn usage(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(CommandErrorCode::TenantCommandUsage, phase, message, None)
    }

    /// Creates an error from the archive manager
    pub fn archive(phase: Phase, source: ArchiveError) -> Self {
        Self::wrap(CommandErrorCode::TenantCommandArchive, phase, source)
    }

    /// Creates a rewrite error
    pub fn rewrite(source: std::io::Error) -> Self {
        Self::wrap(CommandErrorCode::TenantCommandRewrite, Phase::Rewrite, source)
    }

    /// Creates an error from the data layer or an external tool
    pub fn database(phase: Phase, source: DatabaseError) -> Self {
        Self::wrap(CommandErrorCode::TenantCommandDatabase, phase, source)
    }

    /// Creates an error from an object store or media transfer
    pub fn storage(phase: Phase, source: StorageError) -> Self {
        Self::wrap(CommandErrorCode::TenantCommandStorage, phase, source)
    }

    /// The load failed and the previous state was restored; reports the
    /// original failure
    pub fn rolled_back(original: CommandError) -> Self {
        Self::new(
            CommandErrorCode::TenantCommandRolledBack,
            original.phase,
            original.message.clone(),
            Some(Box::new(original)),
        )
    }

    /// The recovery reload failed
    pub fn recovery_failed(source: DatabaseError) -> Self {
        Self::wrap(CommandErrorCode::TenantCommandRecoveryFailed, Phase::Recovery, source)
    }

    /// Returns the error code
    pub fn code(&self) -> CommandErrorCode {
        self.code
    }

    /// Returns the failing phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity of this error
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// True for errors raised before any destructive step
    pub fn is_usage(&self) -> bool {
        self.code == CommandErrorCode::TenantCommandUsage
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.code.severity(),
            self.code,
            self.phase,
            self.message
        )
    }
}

impl StdError for CommandError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_display() {
        let err = CommandError::usage(Phase::Select, "No tenant selected.");
        assert_eq!(
            err.to_string(),
            "[ERROR] TENANT_COMMAND_USAGE (select): No tenant selected."
        );
        assert!(err.is_usage());
    }

    #[test]
    fn test_wrapped_error_keeps_source() {
        let err = CommandError::database(
            Phase::Load,
            DatabaseError::ToolFailed {
                program: "psql".into(),
                status: "exit status: 3".into(),
                stderr: "syntax error".into(),
            },
        );

        assert_eq!(err.phase(), Phase::Load);
        assert_eq!(err.message(), "psql exited with exit status: 3: syntax error");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_rolled_back_reports_original() {
        let original = CommandError::database(
            Phase::Load,
            DatabaseError::UnexpectedResult("boom".into()),
        );
        let message = original.message().to_string();

        let err = CommandError::rolled_back(original);
        assert_eq!(err.code(), CommandErrorCode::TenantCommandRolledBack);
        assert_eq!(err.phase(), Phase::Load);
        assert_eq!(err.message(), message);
    }

    #[test]
    fn test_recovery_failure_is_fatal() {
        let err = CommandError::recovery_failed(DatabaseError::NotInitialized);
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.to_string().starts_with("[FATAL] TENANT_COMMAND_RECOVERY_FAILED (recovery)"));
    }
}
