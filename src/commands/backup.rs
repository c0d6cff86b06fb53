//! backup_tenant

use std::fs;
use std::path::PathBuf;

use super::{run_phase, CommandContext, CommandError, CommandResult, Phase};
use crate::archive::{ArchiveFormat, BackupMetadata, TenantArchive};
use crate::database::Tenant;
use crate::location::Location;
use crate::observability::{log_event_with_fields, Event};

const OPERATION: &str = "BACKUP";

/// Result of a successful backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    /// Final archive path for local locations; `None` after an upload
    pub archive_path: Option<PathBuf>,
    /// Number of media files captured
    pub media_files: usize,
}

/// Dumps the selected tenant's namespace and media into an archive at
/// `location`.
///
/// With `skip_media` the media tree is neither fetched nor archived, and the
/// fact is recorded in the metadata.
pub fn backup_tenant(
    ctx: &CommandContext,
    location: &Location,
    skip_media: bool,
) -> CommandResult<BackupOutcome> {
    let tenant = ctx.tenant()?;
    let location_str = location.to_string();

    log_event_with_fields(
        Event::BackupStart,
        &[
            ("namespace", tenant.namespace.as_str()),
            ("location", &location_str),
            ("skip_media", if skip_media { "true" } else { "false" }),
        ],
    );

    let _active = ctx.session.enter(tenant.namespace.clone());
    let mut archive = ctx.new_archive();

    let result = run_backup(ctx, tenant, &mut archive, location, skip_media);
    archive.stop();

    match &result {
        Ok(_) => log_event_with_fields(
            Event::BackupComplete,
            &[("namespace", tenant.namespace.as_str()), ("location", &location_str)],
        ),
        Err(e) => log_event_with_fields(
            Event::BackupFailed,
            &[
                ("namespace", tenant.namespace.as_str()),
                ("phase", e.phase().as_str()),
                ("reason", e.message()),
            ],
        ),
    }

    result
}

fn run_backup(
    ctx: &CommandContext,
    tenant: &Tenant,
    archive: &mut TenantArchive,
    location: &Location,
    skip_media: bool,
) -> CommandResult<BackupOutcome> {
    let namespace = &tenant.namespace;

    archive
        .start()
        .map_err(|e| CommandError::archive(Phase::Dump, e))?;

    run_phase(OPERATION, Phase::Dump, namespace, || {
        ctx.orchestrator
            .dump(namespace, &archive.schema_dump_path())
            .map_err(|e| CommandError::database(Phase::Dump, e))
    })?;

    let media_files = if skip_media {
        0
    } else {
        run_phase(OPERATION, Phase::Media, namespace, || {
            ctx.media
                .download(tenant, &archive.media_dir())
                .map_err(|e| CommandError::storage(Phase::Media, e))
        })?
    };

    run_phase(OPERATION, Phase::Metadata, namespace, || {
        let metadata = BackupMetadata::new(namespace.as_str(), &tenant.domain_url, skip_media);
        let fields = metadata
            .to_fields()
            .map_err(|e| CommandError::archive(Phase::Metadata, e))?;
        archive
            .add_metadata(fields)
            .map_err(|e| CommandError::archive(Phase::Metadata, e))
    })?;

    let destination = match location {
        Location::Local(path) => Some(path.as_path()),
        Location::Remote(_) => None,
    };

    let archive_path = run_phase(OPERATION, Phase::Archive, namespace, || {
        archive
            .archive_all(destination)
            .map_err(|e| CommandError::archive(Phase::Archive, e))
    })?;

    match location {
        Location::Local(_) => Ok(BackupOutcome {
            archive_path: Some(archive_path),
            media_files,
        }),
        Location::Remote(object) => {
            run_phase(OPERATION, Phase::Upload, namespace, || {
                ctx.object_store
                    .put(object, &archive_path, ArchiveFormat::Tar.content_type())
                    .map_err(|e| CommandError::storage(Phase::Upload, e))
            })?;

            let _ = fs::remove_file(&archive_path);

            Ok(BackupOutcome {
                archive_path: None,
                media_files,
            })
        }
    }
}
