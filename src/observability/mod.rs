//! Observability for tenant backup operations
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Phase scopes that always close with COMPLETE, FAILED or INCOMPLETE
//!
//! # Usage
//!
//! ```ignore
//! use tenant_backup::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::BackupStart, &[("namespace", "acme")]);
//!
//! let scope = ObservationScope::new("BACKUP_DUMP");
//! // ... do work ...
//! scope.complete();
//! ```
//!
//! Logging never fails the operation it observes: write errors on
//! stdout/stderr are dropped.

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::{ObservationScope, Timer};

fn severity_for(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_for(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_for(event), event.as_str(), fields);
}
