//! Media transfer between the scratch directory and durable storage
//!
//! Two backends:
//!
//! - [`WalkingTransfer`]: generic storage, one get/put per file
//! - [`S3SyncTransfer`]: delegates to `aws s3 sync`
//!
//! A tenant's media lives under its domain in the storage root. Any single
//! failed file aborts the whole transfer.

mod sync;
mod walk;

pub use sync::S3SyncTransfer;
pub use walk::WalkingTransfer;

use std::path::Path;

use crate::database::Tenant;
use crate::storage::StorageResult;

/// Thumbnail cache directory, excluded by default
pub const DEFAULT_EXCLUDES: &[&str] = &["__sized__"];

/// Bulk media copy for one tenant. Both directions return the number of
/// files moved.
pub trait MediaTransfer: Send + Sync + std::fmt::Debug {
    /// Fill `destination` with the tenant's media
    fn download(&self, tenant: &Tenant, destination: &Path) -> StorageResult<usize>;

    /// Push the contents of `source` to the tenant's media
    fn upload(&self, tenant: &Tenant, source: &Path) -> StorageResult<usize>;
}

fn is_excluded(excludes: &[String], name: &str) -> bool {
    excludes.iter().any(|exclude| exclude == name)
}

/// Joins non-empty parts with `/`
fn join_key<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|part| -> &str { part.as_ref() })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
