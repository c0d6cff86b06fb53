//! rollback_tenant
//!
//! Restore with a safety net: the namespace's current contents are dumped to
//! a temporary recovery file before anything is dropped. If dropping or
//! loading the new dump fails, the namespace is dropped again and the
//! recovery file is loaded back.
//!
//! This is not transactional. Writes that land between the recovery dump and
//! the end of the command are lost; callers must keep other writers away
//! from the tenant while it runs.

use std::path::Path;

use tempfile::NamedTempFile;

use super::{
    fetch_and_extract, restore_media, rewrite_dump, run_phase, validate_archive, CommandContext,
    CommandError, CommandResult, Phase,
};
use crate::archive::{ArchiveError, TenantArchive};
use crate::database::{Namespace, Tenant};
use crate::location::Location;
use crate::observability::{log_event_with_fields, Event, ObservationScope};

const OPERATION: &str = "ROLLBACK";

/// Result of a successful rollback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Namespace the backup was taken from
    pub source_namespace: String,
    /// Qualified identifiers rewritten to the target namespace
    pub rewritten: usize,
    /// Media files uploaded
    pub media_files: usize,
}

/// Replaces an existing namespace with the backup at `location`, restoring
/// the previous contents if the load fails.
///
/// On a failed load that was recovered, the error carries the original
/// failure's message. If the recovery load fails too, its error is returned
/// instead.
pub fn rollback_tenant(ctx: &CommandContext, location: &Location) -> CommandResult<RollbackOutcome> {
    let tenant = ctx.tenant()?;
    let location_str = location.to_string();

    log_event_with_fields(
        Event::RollbackStart,
        &[
            ("namespace", tenant.namespace.as_str()),
            ("location", &location_str),
        ],
    );

    let _active = ctx.session.enter(tenant.namespace.clone());
    let mut archive = ctx.new_archive();

    let result = run_rollback(ctx, tenant, &mut archive, location);
    archive.stop();

    match &result {
        Ok(_) => log_event_with_fields(
            Event::RollbackComplete,
            &[("namespace", tenant.namespace.as_str()), ("location", &location_str)],
        ),
        Err(e) => log_event_with_fields(
            Event::RollbackFailed,
            &[
                ("namespace", tenant.namespace.as_str()),
                ("code", e.code().as_str()),
                ("phase", e.phase().as_str()),
                ("reason", e.message()),
            ],
        ),
    }

    result
}

fn run_rollback(
    ctx: &CommandContext,
    tenant: &Tenant,
    archive: &mut TenantArchive,
    location: &Location,
) -> CommandResult<RollbackOutcome> {
    let namespace = &tenant.namespace;

    let exists = ctx
        .orchestrator
        .database()
        .namespace_exists(namespace)
        .map_err(|e| CommandError::database(Phase::Validate, e))?;
    if !exists {
        return Err(CommandError::usage(
            Phase::Validate,
            format!(
                "Namespace {} does not exist, use restore_tenant instead",
                namespace.quoted()
            ),
        ));
    }

    fetch_and_extract(ctx, OPERATION, archive, location, namespace)?;
    let metadata = validate_archive(archive, false)?;
    let rewritten = rewrite_dump(OPERATION, archive, &metadata, namespace)?;

    let recovery = run_phase(OPERATION, Phase::Dump, namespace, || {
        let file = tempfile::Builder::new()
            .prefix("tenant-recovery-")
            .suffix(".sql")
            .tempfile()
            .map_err(|e| {
                CommandError::archive(
                    Phase::Dump,
                    ArchiveError::io_error("Failed to create recovery dump file", e),
                )
            })?;

        ctx.orchestrator
            .dump(namespace, file.path())
            .map_err(|e| CommandError::database(Phase::Dump, e))?;
        Ok(file)
    })?;

    if let Err(original) = replace_namespace(ctx, namespace, &archive.schema_dump_path()) {
        recover(ctx, namespace, &recovery, &original)?;
        return Err(CommandError::rolled_back(original));
    }

    let media_files = restore_media(ctx, OPERATION, archive, tenant)?;

    Ok(RollbackOutcome {
        source_namespace: metadata.schema_name,
        rewritten,
        media_files,
    })
}

fn replace_namespace(ctx: &CommandContext, namespace: &Namespace, dump: &Path) -> CommandResult<()> {
    run_phase(OPERATION, Phase::Drop, namespace, || {
        ctx.orchestrator
            .drop_namespace(namespace)
            .map_err(|e| CommandError::database(Phase::Drop, e))
    })?;

    run_phase(OPERATION, Phase::Load, namespace, || {
        ctx.orchestrator
            .load(namespace, dump)
            .map_err(|e| CommandError::database(Phase::Load, e))
    })
}

/// Drops the half-loaded namespace and reloads the recovery snapshot
fn recover(
    ctx: &CommandContext,
    namespace: &Namespace,
    recovery: &NamedTempFile,
    original: &CommandError,
) -> CommandResult<()> {
    log_event_with_fields(
        Event::RollbackRecoveryBegin,
        &[
            ("namespace", namespace.as_str()),
            ("phase", original.phase().as_str()),
            ("reason", original.message()),
        ],
    );

    let scope = ObservationScope::with_fields(
        format!("{}_RECOVERY", OPERATION),
        &[("namespace", namespace.as_str())],
    );

    let reloaded = ctx
        .orchestrator
        .drop_namespace(namespace)
        .and_then(|()| ctx.orchestrator.load(namespace, recovery.path()));

    match reloaded {
        Ok(()) => {
            scope.complete();
            log_event_with_fields(
                Event::RollbackRecoveryComplete,
                &[("namespace", namespace.as_str())],
            );
            Ok(())
        }
        Err(e) => {
            let err = CommandError::recovery_failed(e);
            scope.fail_fatal(err.message());
            log_event_with_fields(
                Event::RollbackRecoveryFailed,
                &[
                    ("namespace", namespace.as_str()),
                    ("reason", err.message()),
                    ("recovery_dump", &recovery.path().display().to_string()),
                ],
            );
            Err(err)
        }
    }
}
