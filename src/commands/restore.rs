//! restore_tenant

use super::{
    fetch_and_extract, restore_media, rewrite_dump, run_phase, update_site_domain,
    validate_archive, CommandContext, CommandError, CommandResult, Phase,
};
use crate::archive::{ArchiveFormat, TenantArchive};
use crate::database::Tenant;
use crate::location::Location;
use crate::observability::{log_event_with_fields, Event};

const OPERATION: &str = "RESTORE";

/// Result of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Namespace the backup was taken from
    pub source_namespace: String,
    /// Container encoding that was read
    pub format: ArchiveFormat,
    /// Qualified identifiers rewritten to the target namespace
    pub rewritten: usize,
    /// Media files uploaded (0 with skip_media)
    pub media_files: usize,
    /// Whether the site domain was changed
    pub site_domain_updated: bool,
}

/// Replaces the selected tenant's namespace with the backup at `location`.
///
/// A backup taken with `skip_media` is refused unless `skip_media` is given
/// here as well; that check, like every other validation, happens before the
/// namespace is dropped. A failure after the drop leaves the namespace as it
/// is; only rollback_tenant attempts recovery.
pub fn restore_tenant(
    ctx: &CommandContext,
    location: &Location,
    skip_media: bool,
) -> CommandResult<RestoreOutcome> {
    let tenant = ctx.tenant()?;
    let location_str = location.to_string();

    log_event_with_fields(
        Event::RestoreStart,
        &[
            ("namespace", tenant.namespace.as_str()),
            ("location", &location_str),
            ("skip_media", if skip_media { "true" } else { "false" }),
        ],
    );

    let _active = ctx.session.enter(tenant.namespace.clone());
    let mut archive = ctx.new_archive();

    let result = run_restore(ctx, tenant, &mut archive, location, skip_media);
    archive.stop();

    match &result {
        Ok(outcome) => log_event_with_fields(
            Event::RestoreComplete,
            &[
                ("namespace", tenant.namespace.as_str()),
                ("source", &outcome.source_namespace),
                ("location", &location_str),
            ],
        ),
        Err(e) => log_event_with_fields(
            Event::RestoreFailed,
            &[
                ("namespace", tenant.namespace.as_str()),
                ("phase", e.phase().as_str()),
                ("reason", e.message()),
            ],
        ),
    }

    result
}

fn run_restore(
    ctx: &CommandContext,
    tenant: &Tenant,
    archive: &mut TenantArchive,
    location: &Location,
    skip_media: bool,
) -> CommandResult<RestoreOutcome> {
    let namespace = &tenant.namespace;

    let format = fetch_and_extract(ctx, OPERATION, archive, location, namespace)?;
    let metadata = validate_archive(archive, skip_media)?;
    let rewritten = rewrite_dump(OPERATION, archive, &metadata, namespace)?;

    run_phase(OPERATION, Phase::Drop, namespace, || {
        ctx.orchestrator
            .drop_namespace(namespace)
            .map_err(|e| CommandError::database(Phase::Drop, e))
    })?;

    run_phase(OPERATION, Phase::Load, namespace, || {
        ctx.orchestrator
            .load(namespace, &archive.schema_dump_path())
            .map_err(|e| CommandError::database(Phase::Load, e))
    })?;

    let media_files = if skip_media {
        0
    } else {
        restore_media(ctx, OPERATION, archive, tenant)?
    };

    let site_domain_updated = update_site_domain(ctx, OPERATION, tenant, &metadata)?;

    Ok(RestoreOutcome {
        source_namespace: metadata.schema_name,
        format,
        rewritten,
        media_files,
        site_domain_updated,
    })
}
