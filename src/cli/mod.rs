//! CLI module for tenant-backup
//!
//! Provides command-line interface for:
//! - backup_tenant: Dump a tenant's schema and media into an archive
//! - restore_tenant: Replace a tenant's schema from an archive
//! - rollback_tenant: Restore, reloading the current schema if loading fails

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{build_context, run, run_command, select_tenant};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_response, write_response_to};
