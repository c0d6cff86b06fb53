//! CLI argument definitions using clap
//!
//! Commands:
//! - tenant-backup --tenant <domain> backup_tenant <location> [--skip_media]
//! - tenant-backup --tenant <domain> restore_tenant <location> [--skip_media]
//! - tenant-backup --tenant <domain> rollback_tenant <location>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Back up, restore and roll back tenant schemas
#[derive(Parser, Debug)]
#[command(name = "tenant-backup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to ./tenant-backup.json if present)
    #[arg(long, global = true, env = "TENANT_BACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Domain of the tenant to operate on
    #[arg(long, global = true, env = "TENANT_DOMAIN")]
    pub tenant: Option<String>,

    /// Schema of the tenant (defaults to the first label of the domain)
    #[arg(long, global = true, env = "TENANT_SCHEMA")]
    pub schema: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Dump the tenant's schema and media into an archive
    #[command(name = "backup_tenant")]
    Backup {
        /// Local path or s3://bucket/key
        location: String,

        /// Leave media files out of the archive
        #[arg(long = "skip_media")]
        skip_media: bool,
    },

    /// Replace the tenant's schema with an archived one
    #[command(name = "restore_tenant")]
    Restore {
        /// Local path or s3://bucket/key
        location: String,

        /// Restore an archive taken without media
        #[arg(long = "skip_media")]
        skip_media: bool,
    },

    /// Like restore_tenant, but reload the current schema if loading fails
    #[command(name = "rollback_tenant")]
    Rollback {
        /// Local path or s3://bucket/key
        location: String,
    },
}

impl Command {
    /// The command name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Command::Backup { .. } => "backup_tenant",
            Command::Restore { .. } => "restore_tenant",
            Command::Rollback { .. } => "rollback_tenant",
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Command::Backup { location, .. }
            | Command::Restore { location, .. }
            | Command::Rollback { location } => location,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
