//! rollback_tenant integration tests
//!
//! Tests for:
//! - A failed load is undone by reloading the recovery snapshot
//! - The caller sees the original load failure
//! - A failed recovery surfaces unmasked and FATAL
//! - Validation and the existence check happen before the snapshot is taken

mod common;

use common::*;
use std::fs;
use std::path::Path;
use tenant_backup::commands::{
    backup_tenant, rollback_tenant, CommandErrorCode, Phase, Severity, MEDIA_MISSING_MESSAGE,
};
use tenant_backup::database::{Namespace, Session};
use tenant_backup::location::Location;

/// Backs up `acme` holding `rows` rows into `dest`, with two media files
fn make_backup(h: &Harness, dest: &Path, rows: usize, skip_media: bool) {
    h.cluster.seed("acme", &sample_dump("acme", "acme.example.com", rows));
    h.add_media("acme.example.com", "products/shirt.jpg", b"shirt");
    h.add_media("acme.example.com", "products/hat.jpg", b"hat");

    let ctx = h.context(Some(tenant("acme.example.com")));
    backup_tenant(&ctx, &Location::Local(dest.to_path_buf()), skip_media).unwrap();
}

/// Re-dumps `namespace` through the same tools the commands use
fn redump(h: &Harness, namespace: &str) -> String {
    let ctx = h.context(None);
    let path = h.out_path(&format!("{}-redump.sql", namespace));
    ctx.orchestrator
        .dump(&Namespace::new(namespace).unwrap(), &path)
        .unwrap();
    fs::read_to_string(path).unwrap()
}

// =============================================================================
// Successful rollback
// =============================================================================

#[test]
fn test_rollback_replaces_namespace() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);
    let backed_up = h.cluster.contents("acme").unwrap();

    // state moves on after the backup
    h.cluster.seed("acme", &sample_dump("acme", "acme.example.com", 9));

    let ctx = h.context(Some(tenant("acme.example.com")));
    let outcome = rollback_tenant(&ctx, &Location::Local(dest)).unwrap();

    assert_eq!(outcome.source_namespace, "acme");
    assert_eq!(outcome.media_files, 2);
    assert_eq!(h.cluster.contents("acme").unwrap(), backed_up);
    assert!(h.scratch_is_clean());

    // recovery dump, then the load
    let programs = h.cluster.programs();
    assert_eq!(programs[programs.len() - 2..].to_vec(), vec!["pg_dump", "psql"]);
}

#[test]
fn test_rollback_into_other_namespace_rewrites() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);
    h.cluster.seed("globex", &sample_dump("globex", "globex.example.com", 1));

    let ctx = h.context(Some(tenant("globex.example.com")));
    let outcome = rollback_tenant(&ctx, &Location::Local(dest)).unwrap();

    let loaded = h.cluster.contents("globex").unwrap();
    assert_eq!(outcome.source_namespace, "acme");
    assert!(outcome.rewritten > 0);
    assert!(loaded.contains("CREATE SCHEMA \"globex\";"));
    assert!(!loaded.contains("\"acme\"."));
    assert!(loaded.contains("3\tProduct 3\n"));
}

// =============================================================================
// Recovery
// =============================================================================

/// The load fails on the second external call; the namespace ends up as
/// it was before the rollback and the error is the load's.
#[test]
fn test_failed_load_reloads_recovery_snapshot() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);

    h.cluster.seed("acme", &sample_dump("acme", "acme.example.com", 7));
    let baseline = redump(&h, "acme");

    let before = h.cluster.calls().len();
    h.cluster.fail_call_from_now(2);

    let ctx = h.context(Some(tenant("acme.example.com")));
    let err = rollback_tenant(&ctx, &Location::Local(dest)).unwrap_err();

    assert_eq!(err.code(), CommandErrorCode::TenantCommandRolledBack);
    assert_eq!(err.phase(), Phase::Load);
    assert_eq!(
        err.message(),
        format!(
            "psql exited with exit status: 3: ERROR: injected failure in call {}",
            before + 2
        )
    );

    assert_eq!(redump(&h, "acme"), baseline);
    assert_eq!(h.cluster.drops(), vec!["acme", "acme"]);
    assert!(h.scratch_is_clean());
}

#[test]
fn test_failed_recovery_is_fatal_and_unmasked() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);

    let before = h.cluster.calls().len();
    h.cluster.fail_call_from_now(2);
    h.cluster.fail_call_from_now(3);

    let ctx = h.context(Some(tenant("acme.example.com")));
    let err = rollback_tenant(&ctx, &Location::Local(dest)).unwrap_err();

    assert_eq!(err.code(), CommandErrorCode::TenantCommandRecoveryFailed);
    assert_eq!(err.severity(), Severity::Fatal);
    assert_eq!(err.phase(), Phase::Recovery);
    assert!(err
        .message()
        .ends_with(&format!("injected failure in call {}", before + 3)));

    // no retry after the recovery load
    assert_eq!(h.cluster.calls().len(), before + 3);
    assert!(h.scratch_is_clean());
}

// =============================================================================
// Preconditions
// =============================================================================

#[test]
fn test_rollback_requires_existing_namespace() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);
    let before = h.cluster.calls().len();

    let ctx = h.context(Some(tenant("globex.example.com")));
    let err = rollback_tenant(&ctx, &Location::Local(dest)).unwrap_err();

    assert!(err.is_usage());
    assert_eq!(err.phase(), Phase::Validate);
    assert!(err.message().contains("\"globex\""));
    assert_eq!(h.cluster.calls().len(), before);
    assert!(h.scratch_is_clean());
}

/// Rollback has no skip_media: a media-less archive is refused before the
/// recovery snapshot and before any drop.
#[test]
fn test_rollback_refuses_media_less_backup() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, true);
    let before = h.cluster.calls().len();

    let ctx = h.context(Some(tenant("acme.example.com")));
    let err = rollback_tenant(&ctx, &Location::Local(dest)).unwrap_err();

    assert_eq!(err.message(), MEDIA_MISSING_MESSAGE);
    assert_eq!(h.cluster.calls().len(), before);
    assert!(h.cluster.drops().is_empty());
    assert!(h.scratch_is_clean());
}

#[test]
fn test_recovery_dump_failure_is_not_destructive() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);
    let current = h.cluster.contents("acme").unwrap();

    h.cluster.fail_call_from_now(1);

    let ctx = h.context(Some(tenant("acme.example.com")));
    let err = rollback_tenant(&ctx, &Location::Local(dest)).unwrap_err();

    assert_eq!(err.phase(), Phase::Dump);
    assert!(h.cluster.drops().is_empty());
    assert_eq!(h.cluster.contents("acme").unwrap(), current);
}

#[test]
fn test_rollback_restores_active_namespace() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);

    let public = Namespace::new("public").unwrap();
    let ctx = h.context_with_session(
        Some(tenant("acme.example.com")),
        Session::with_active(public.clone()),
    );

    h.cluster.fail_call_from_now(2);
    rollback_tenant(&ctx, &Location::Local(dest.clone())).unwrap_err();
    assert_eq!(ctx.session.active(), Some(public.clone()));

    rollback_tenant(&ctx, &Location::Local(dest)).unwrap();
    assert_eq!(ctx.session.active(), Some(public));
}

/// A media failure after a successful load is not rolled back.
#[test]
fn test_rollback_media_failure_cleans_up() {
    let h = Harness::new();
    let dest = h.out_path("acme.tar");
    make_backup(&h, &dest, 3, false);

    let mut ctx = h.context_with_session(
        Some(tenant("acme.example.com")),
        Session::with_active(public_namespace()),
    );
    ctx.media = FailingMedia::on_upload();
    let err = rollback_tenant(&ctx, &Location::Local(dest)).unwrap_err();

    assert_eq!(err.phase(), Phase::Media);
    assert_eq!(err.code(), CommandErrorCode::TenantCommandStorage);
    assert_eq!(h.cluster.drops(), vec!["acme"]);
    assert!(h.cluster.contents("acme").is_some());
    assert!(h.scratch_is_clean());
    assert_eq!(ctx.session.active(), Some(public_namespace()));
}
