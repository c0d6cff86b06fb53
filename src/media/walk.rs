//! Breadth-first media copy over a [`MediaStorage`] backend

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use super::{is_excluded, join_key, MediaTransfer};
use crate::database::Tenant;
use crate::storage::{MediaStorage, StorageError, StorageResult};

/// Copies one file at a time, walking directories with an explicit queue.
/// Excluded directory names are skipped at any depth.
#[derive(Debug)]
pub struct WalkingTransfer<S> {
    storage: S,
    excludes: Vec<String>,
}

impl<S: MediaStorage> WalkingTransfer<S> {
    pub fn new(storage: S, excludes: Vec<String>) -> Self {
        Self { storage, excludes }
    }
}

impl<S: MediaStorage> MediaTransfer for WalkingTransfer<S> {
    fn download(&self, tenant: &Tenant, destination: &Path) -> StorageResult<usize> {
        fs::create_dir_all(destination)?;

        let mut copied = 0;
        let mut queue = VecDeque::from([String::new()]);

        while let Some(relative) = queue.pop_front() {
            let (dirs, files) = self
                .storage
                .list_dir(&join_key(&[&tenant.domain_url, &relative]))?;

            let local_dir = destination.join(&relative);
            fs::create_dir_all(&local_dir)?;

            for file in files {
                let data = self
                    .storage
                    .read(&join_key(&[&tenant.domain_url, &relative, &file]))?;
                fs::write(local_dir.join(&file), data)?;
                copied += 1;
            }

            for dir in dirs {
                if !is_excluded(&self.excludes, &dir) {
                    queue.push_back(join_key(&[&relative, &dir]));
                }
            }
        }

        Ok(copied)
    }

    fn upload(&self, tenant: &Tenant, source: &Path) -> StorageResult<usize> {
        if !source.is_dir() {
            return Ok(0);
        }

        let mut copied = 0;
        let mut queue = VecDeque::from([String::new()]);

        while let Some(relative) = queue.pop_front() {
            let mut entries = fs::read_dir(source.join(&relative))?
                .collect::<Result<Vec<_>, _>>()?;
            entries.sort_by_key(|entry| entry.file_name());

            for entry in entries {
                let name = entry
                    .file_name()
                    .into_string()
                    .map_err(|name| StorageError::InvalidPath(name.to_string_lossy().into_owned()))?;

                if entry.file_type()?.is_dir() {
                    if !is_excluded(&self.excludes, &name) {
                        queue.push_back(join_key(&[&relative, &name]));
                    }
                    continue;
                }

                let data = fs::read(entry.path())?;
                self.storage
                    .write(&join_key(&[&tenant.domain_url, &relative, &name]), &data)?;
                copied += 1;
            }
        }

        Ok(copied)
    }
}
