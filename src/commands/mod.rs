//! Backup, restore and rollback
//!
//! Each command is a strictly sequential state machine over the components:
//!
//! ```text
//! backup:   select → dump → media → metadata → archive → upload
//! restore:  select → fetch → extract → validate → rewrite → drop → load → media → bookkeeping
//! rollback: select → fetch → extract → validate → rewrite → recovery dump → drop → load → media
//!                                                                      └─ on failure: drop → reload recovery dump
//! ```
//!
//! Guarantees on every exit path:
//!
//! - the scratch directory is removed
//! - the session's active namespace is put back
//! - nothing destructive happens before validation has passed

mod backup;
mod errors;
mod restore;
mod rollback;

pub use backup::{backup_tenant, BackupOutcome};
pub use errors::{CommandError, CommandErrorCode, CommandResult, Phase, Severity};
pub use restore::{restore_tenant, RestoreOutcome};
pub use rollback::{rollback_tenant, RollbackOutcome};

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::{ArchiveError, ArchiveFormat, BackupMetadata, TenantArchive, BACKUP_VERSION};
use crate::database::{DumpOrchestrator, Namespace, Session, Tenant};
use crate::location::Location;
use crate::media::MediaTransfer;
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::rewriter::SchemaRewriter;
use crate::storage::ObjectStore;

/// Message shown when a media-less backup is restored without `--skip_media`
pub const MEDIA_MISSING_MESSAGE: &str =
    "Selected backup does not include media files. Add --skip_media flag to restore this backup";

/// Message shown when no tenant is selected
pub const NO_TENANT_MESSAGE: &str = "No tenant selected.";

/// Everything a command needs, assembled once by the caller
#[derive(Debug)]
pub struct CommandContext {
    /// Active-namespace holder for the data layer connection
    pub session: Session,
    /// Tenant the command operates on
    pub tenant: Option<Tenant>,
    pub orchestrator: DumpOrchestrator,
    pub media: Arc<dyn MediaTransfer>,
    pub object_store: Arc<dyn ObjectStore>,
    /// Parent of scratch directories
    pub scratch_root: PathBuf,
}

impl CommandContext {
    /// The selected tenant, or the "No tenant selected." error
    pub fn tenant(&self) -> CommandResult<&Tenant> {
        self.tenant
            .as_ref()
            .ok_or_else(|| CommandError::usage(Phase::Select, NO_TENANT_MESSAGE))
    }

    fn new_archive(&self) -> TenantArchive {
        TenantArchive::new(&self.scratch_root)
    }
}

/// Runs one phase inside an observation scope named `<OPERATION>_<PHASE>`
fn run_phase<T>(
    operation: &str,
    phase: Phase,
    namespace: &Namespace,
    f: impl FnOnce() -> CommandResult<T>,
) -> CommandResult<T> {
    let scope = ObservationScope::with_fields(
        format!("{}_{}", operation, phase.as_str().to_uppercase()),
        &[("namespace", namespace.as_str())],
    );

    match f() {
        Ok(value) => {
            scope.complete();
            Ok(value)
        }
        Err(e) => {
            scope.fail(e.message());
            Err(e)
        }
    }
}

/// Starts `archive` and fills it from `location`
fn fetch_and_extract(
    ctx: &CommandContext,
    operation: &str,
    archive: &mut TenantArchive,
    location: &Location,
    namespace: &Namespace,
) -> CommandResult<ArchiveFormat> {
    archive
        .start()
        .map_err(|e| CommandError::archive(Phase::Fetch, e))?;

    match location {
        Location::Local(path) => run_phase(operation, Phase::Extract, namespace, || {
            archive
                .extract_all(path)
                .map_err(|e| CommandError::archive(Phase::Extract, e))
        }),
        Location::Remote(object) => {
            let incoming = archive.scratch_dir().join(".incoming");

            let content_type = run_phase(operation, Phase::Fetch, namespace, || {
                ctx.object_store
                    .get(object, &incoming)
                    .map_err(|e| CommandError::storage(Phase::Fetch, e))
            })?;

            if content_type
                .as_deref()
                .and_then(ArchiveFormat::from_content_type)
                .is_none()
            {
                return Err(CommandError::usage(
                    Phase::Fetch,
                    format!(
                        "Unsupported backup format: {}",
                        content_type.as_deref().unwrap_or("None")
                    ),
                ));
            }

            let format = run_phase(operation, Phase::Extract, namespace, || {
                let file = File::open(&incoming).map_err(|e| {
                    CommandError::archive(
                        Phase::Extract,
                        ArchiveError::io_error_at_path(&incoming, e),
                    )
                })?;
                archive
                    .extract_from_reader(file)
                    .map_err(|e| CommandError::archive(Phase::Extract, e))
            })?;

            let _ = fs::remove_file(&incoming);
            Ok(format)
        }
    }
}

/// Checks the extracted archive can be loaded, before anything is dropped
fn validate_archive(archive: &TenantArchive, skip_media: bool) -> CommandResult<BackupMetadata> {
    let metadata = archive
        .read_metadata()
        .map_err(|e| CommandError::archive(Phase::Validate, e))?;

    let Some(metadata) = metadata else {
        if archive.legacy_schema_path().exists() {
            return Err(CommandError::usage(
                Phase::Validate,
                "Backup version 1 archives hold an ORM fixture and cannot be loaded as SQL",
            ));
        }
        return Err(CommandError::usage(
            Phase::Validate,
            "Selected backup has no metadata.json",
        ));
    };

    if metadata.backup_version > BACKUP_VERSION {
        return Err(CommandError::usage(
            Phase::Validate,
            format!(
                "Unsupported backup version {} (newest supported: {})",
                metadata.backup_version, BACKUP_VERSION
            ),
        ));
    }

    if !archive.schema_dump_path().is_file() {
        return Err(CommandError::usage(
            Phase::Validate,
            "Selected backup has no schema.sql",
        ));
    }

    if Namespace::new(&metadata.schema_name).is_err() {
        return Err(CommandError::usage(
            Phase::Validate,
            format!("Backup names an invalid schema: {:?}", metadata.schema_name),
        ));
    }

    if !skip_media && metadata.skip_media {
        return Err(CommandError::usage(Phase::Validate, MEDIA_MISSING_MESSAGE));
    }

    Ok(metadata)
}

/// Rewrites the dump from the backup's namespace to `target`
fn rewrite_dump(
    operation: &str,
    archive: &TenantArchive,
    metadata: &BackupMetadata,
    target: &Namespace,
) -> CommandResult<usize> {
    let scope = ObservationScope::with_fields(
        format!("{}_REWRITE", operation),
        &[("namespace", target.as_str()), ("source", &metadata.schema_name)],
    );

    let rewriter = SchemaRewriter::new(&metadata.schema_name, target.as_str());
    match rewriter.rewrite_file(&archive.schema_dump_path()) {
        Ok(rewritten) => {
            scope.complete_with_fields(&[("rewritten", &rewritten.to_string())]);
            Ok(rewritten)
        }
        Err(e) => {
            let err = CommandError::rewrite(e);
            scope.fail(err.message());
            Err(err)
        }
    }
}

/// Pushes the extracted media and regenerates derived assets
fn restore_media(
    ctx: &CommandContext,
    operation: &str,
    archive: &TenantArchive,
    tenant: &Tenant,
) -> CommandResult<usize> {
    run_phase(operation, Phase::Media, &tenant.namespace, || {
        let uploaded = ctx
            .media
            .upload(tenant, &archive.media_dir())
            .map_err(|e| CommandError::storage(Phase::Media, e))?;

        ctx.orchestrator
            .regenerate_assets(&tenant.namespace)
            .map_err(|e| CommandError::database(Phase::Media, e))?;

        Ok(uploaded)
    })
}

/// Points the site record at the tenant's domain, unless an operator has
/// changed it away from the backup's domain
fn update_site_domain(
    ctx: &CommandContext,
    operation: &str,
    tenant: &Tenant,
    metadata: &BackupMetadata,
) -> CommandResult<bool> {
    run_phase(operation, Phase::Bookkeeping, &tenant.namespace, || {
        let database = ctx.orchestrator.database();
        let current = database
            .site_domain(&tenant.namespace)
            .map_err(|e| CommandError::database(Phase::Bookkeeping, e))?;

        let untouched = current.as_deref() == Some(metadata.domain.as_str());
        if !untouched || metadata.domain == tenant.domain_url {
            return Ok(false);
        }

        database
            .set_site_domain(&tenant.namespace, &tenant.domain_url)
            .map_err(|e| CommandError::database(Phase::Bookkeeping, e))?;

        log_event_with_fields(
            Event::SiteDomainUpdated,
            &[
                ("namespace", tenant.namespace.as_str()),
                ("from", &metadata.domain),
                ("to", &tenant.domain_url),
            ],
        );
        Ok(true)
    })
}
