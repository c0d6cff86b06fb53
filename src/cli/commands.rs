//! CLI command implementations
//!
//! Startup sequence for every command:
//! 1. Configuration load (file, then environment)
//! 2. Tenant selection
//! 3. Location parsing
//! 4. Component wiring
//! 5. Command execution, result written to stdout as JSON

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;
use crate::commands::{
    backup_tenant, restore_tenant, rollback_tenant, BackupOutcome, CommandContext, RestoreOutcome,
    RollbackOutcome,
};
use crate::config::{ArchiveStoreBackend, Config, MediaBackend, DEFAULT_CONFIG_PATH};
use crate::database::{
    CommandHooks, DumpOrchestrator, ProcessRunner, PsqlDatabase, Session, SystemRunner, Tenant,
};
use crate::location::Location;
use crate::media::{MediaTransfer, S3SyncTransfer, WalkingTransfer};
use crate::observability::{log_event_with_fields, Event};
use crate::storage::{FsObjectStore, LocalMediaStorage, ObjectStore, S3ObjectStore};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let config = load_config(cli.config.as_deref())?;
    let context = build_context(&config, select_tenant(&cli)?, Arc::new(SystemRunner))?;
    run_command(&context, &cli.command, config.default_backup_bucket.as_deref())
}

fn load_config(explicit: Option<&Path>) -> CliResult<Config> {
    let config = Config::resolve(explicit)?;

    let source = explicit
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    log_event_with_fields(Event::ConfigLoaded, &[("path", &source)]);

    Ok(config)
}

/// The tenant named by `--tenant`/`--schema`, if any
pub fn select_tenant(cli: &Cli) -> CliResult<Option<Tenant>> {
    let tenant = cli
        .tenant
        .as_deref()
        .map(|domain| Tenant::new(domain, cli.schema.as_deref()))
        .transpose()?;
    Ok(tenant)
}

/// Wires the configured components into a command context
pub fn build_context(
    config: &Config,
    tenant: Option<Tenant>,
    runner: Arc<dyn ProcessRunner>,
) -> CliResult<CommandContext> {
    let database = PsqlDatabase::new(
        runner.clone(),
        config.tools.psql.clone(),
        config.database.connection_params(),
    )
    .with_site_table(&config.database.site_table)
    .map_err(|e| CliError::config_error(format!("database.site_table: {}", e)))?;

    let hooks = CommandHooks::new(
        runner.clone(),
        config.hooks.migrate.clone(),
        config.hooks.regenerate_thumbnails.clone(),
    );

    let orchestrator = DumpOrchestrator::new(
        Arc::new(database),
        runner.clone(),
        Arc::new(hooks),
        config.tools.pg_dump.clone(),
        config.tools.psql.clone(),
    );

    Ok(CommandContext {
        session: Session::new(),
        tenant,
        orchestrator,
        media: media_transfer(config, runner.clone())?,
        object_store: object_store(config)?,
        scratch_root: config.scratch_root.clone(),
    })
}

fn media_transfer(
    config: &Config,
    runner: Arc<dyn ProcessRunner>,
) -> CliResult<Arc<dyn MediaTransfer>> {
    let media = &config.media;
    let excludes = media.excludes.clone();

    let transfer: Arc<dyn MediaTransfer> = match media.backend {
        MediaBackend::Filesystem => Arc::new(WalkingTransfer::new(
            LocalMediaStorage::new(media.root.clone()),
            excludes,
        )),
        MediaBackend::S3 => {
            let bucket = media.bucket.clone().ok_or_else(|| {
                CliError::config_error("media.bucket is required for the s3 media backend")
            })?;
            Arc::new(S3SyncTransfer::new(
                runner,
                config.tools.aws.clone(),
                bucket,
                media.prefix.clone(),
                excludes,
            ))
        }
    };
    Ok(transfer)
}

fn object_store(config: &Config) -> CliResult<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.archive_store.backend {
        ArchiveStoreBackend::S3 => {
            let store = S3ObjectStore::new(config.archive_store.s3_settings())
                .map_err(|e| CliError::io_error(format!("Failed to start the S3 client: {}", e)))?;
            Arc::new(store)
        }
        ArchiveStoreBackend::Filesystem => {
            let root = config.archive_store.root.clone().ok_or_else(|| {
                CliError::config_error("archive_store.root is required for the filesystem archive store")
            })?;
            Arc::new(FsObjectStore::new(root))
        }
    };
    Ok(store)
}

/// Run one command against a wired context and print its outcome
pub fn run_command(
    context: &CommandContext,
    command: &Command,
    default_bucket: Option<&str>,
) -> CliResult<()> {
    let location = Location::parse(command.location(), default_bucket)?;

    let data = match command {
        Command::Backup { skip_media, .. } => backup_tenant(context, &location, *skip_media)
            .map(|outcome| backup_json(&outcome)),
        Command::Restore { skip_media, .. } => restore_tenant(context, &location, *skip_media)
            .map(|outcome| restore_json(&outcome)),
        Command::Rollback { .. } => {
            rollback_tenant(context, &location).map(|outcome| rollback_json(&outcome))
        }
    }
    .map_err(|e| CliError::command_failed(command.name(), &e))?;

    write_response(data)
}

fn backup_json(outcome: &BackupOutcome) -> serde_json::Value {
    json!({
        "archive": outcome.archive_path.as_ref().map(|p| p.display().to_string()),
        "media_files": outcome.media_files,
    })
}

fn restore_json(outcome: &RestoreOutcome) -> serde_json::Value {
    json!({
        "source_schema": outcome.source_namespace,
        "format": outcome.format.extension(),
        "rewritten": outcome.rewritten,
        "media_files": outcome.media_files,
        "site_domain_updated": outcome.site_domain_updated,
    })
}

fn rollback_json(outcome: &RollbackOutcome) -> serde_json::Value {
    json!({
        "source_schema": outcome.source_namespace,
        "rewritten": outcome.rewritten,
        "media_files": outcome.media_files,
    })
}
