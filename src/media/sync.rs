//! Media transfer delegated to `aws s3 sync`

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{is_excluded, join_key, MediaTransfer};
use crate::database::{Invocation, ProcessRunner, Tenant};
use crate::storage::StorageResult;

/// Bulk transfer with the object store's native recursive sync.
/// Excluded directory names become `--exclude` patterns.
#[derive(Debug, Clone)]
pub struct S3SyncTransfer {
    runner: Arc<dyn ProcessRunner>,
    aws: String,
    bucket: String,
    prefix: String,
    excludes: Vec<String>,
}

impl S3SyncTransfer {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        aws: impl Into<String>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        excludes: Vec<String>,
    ) -> Self {
        Self {
            runner,
            aws: aws.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
            excludes,
        }
    }

    fn tenant_url(&self, tenant: &Tenant) -> String {
        format!(
            "s3://{}/{}/",
            self.bucket,
            join_key(&[self.prefix.trim_matches('/'), tenant.domain_url.as_str()])
        )
    }

    /// `--exclude` patterns matching the directory at the top level and below
    fn exclude_args(&self) -> Vec<String> {
        self.excludes
            .iter()
            .flat_map(|name| {
                [
                    "--exclude".to_string(),
                    format!("{}/*", name),
                    "--exclude".to_string(),
                    format!("*/{}/*", name),
                ]
            })
            .collect()
    }

    fn sync(&self, from: String, to: String) -> StorageResult<()> {
        let invocation = Invocation::new(&self.aws)
            .args(["s3", "sync", "--no-progress", "--only-show-errors"])
            .arg(from)
            .arg(to)
            .args(self.exclude_args());

        self.runner.run(&invocation)?;
        Ok(())
    }
}

impl MediaTransfer for S3SyncTransfer {
    fn download(&self, tenant: &Tenant, destination: &Path) -> StorageResult<usize> {
        fs::create_dir_all(destination)?;
        self.sync(self.tenant_url(tenant), destination.display().to_string())?;
        count_files(destination, &self.excludes)
    }

    fn upload(&self, tenant: &Tenant, source: &Path) -> StorageResult<usize> {
        if !source.is_dir() {
            return Ok(0);
        }
        self.sync(source.display().to_string(), self.tenant_url(tenant))?;
        count_files(source, &self.excludes)
    }
}

fn count_files(root: &Path, excludes: &[String]) -> StorageResult<usize> {
    let mut count = 0;
    let mut queue = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = queue.pop_front() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if !is_excluded(excludes, &entry.file_name().to_string_lossy()) {
                    queue.push_back(entry.path());
                }
            } else {
                count += 1;
            }
        }
    }

    Ok(count)
}
