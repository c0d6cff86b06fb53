//! Observable lifecycle events
//!
//! Phase-level begin/complete/failed events are emitted by
//! [`ObservationScope`](super::ObservationScope); the events here are the
//! one-off facts that don't belong to a single phase.

use std::fmt;

/// Observable events in a backup, restore or rollback run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Backup
    /// Backup started
    BackupStart,
    /// Backup complete
    BackupComplete,
    /// Backup failed
    BackupFailed,

    // Restore
    /// Restore started
    RestoreStart,
    /// Restore complete
    RestoreComplete,
    /// Restore failed
    RestoreFailed,

    // Rollback
    /// Rollback started
    RollbackStart,
    /// Rollback complete
    RollbackComplete,
    /// Rollback failed (recovered or not)
    RollbackFailed,
    /// Loading the new dump failed, recovery snapshot is being reloaded
    RollbackRecoveryBegin,
    /// Recovery snapshot reloaded
    RollbackRecoveryComplete,
    /// Recovery snapshot could not be reloaded (FATAL)
    RollbackRecoveryFailed,

    // Archive
    /// Archive container written
    ArchiveCreated,
    /// Archive member extracted
    ArchiveExtract,
    /// Scratch directory removed
    ScratchRemoved,

    // Data layer
    /// Namespace dropped
    NamespaceDropped,
    /// Site domain rewritten after restore
    SiteDomainUpdated,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::BackupStart => "BACKUP_BEGIN",
            Event::BackupComplete => "BACKUP_COMPLETE",
            Event::BackupFailed => "BACKUP_FAILED",

            Event::RestoreStart => "RESTORE_BEGIN",
            Event::RestoreComplete => "RESTORE_COMPLETE",
            Event::RestoreFailed => "RESTORE_FAILED",

            Event::RollbackStart => "ROLLBACK_BEGIN",
            Event::RollbackComplete => "ROLLBACK_COMPLETE",
            Event::RollbackFailed => "ROLLBACK_FAILED",
            Event::RollbackRecoveryBegin => "ROLLBACK_RECOVERY_BEGIN",
            Event::RollbackRecoveryComplete => "ROLLBACK_RECOVERY_COMPLETE",
            Event::RollbackRecoveryFailed => "ROLLBACK_RECOVERY_FAILED",

            Event::ArchiveCreated => "ARCHIVE_CREATED",
            Event::ArchiveExtract => "ARCHIVE_EXTRACT",
            Event::ScratchRemoved => "SCRATCH_REMOVED",

            Event::NamespaceDropped => "NAMESPACE_DROPPED",
            Event::SiteDomainUpdated => "SITE_DOMAIN_UPDATED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::RollbackRecoveryFailed)
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::BackupFailed
                | Event::RestoreFailed
                | Event::RollbackFailed
                | Event::RollbackRecoveryBegin
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
