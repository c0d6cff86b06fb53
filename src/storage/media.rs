//! # Media Storage Backends
//!
//! Durable home of tenant media files, addressed by `/`-separated relative
//! paths. Directory listings are sorted so transfers are reproducible.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::errors::{StorageError, StorageResult};

/// List/read/write access to a media tree
pub trait MediaStorage: Send + Sync + std::fmt::Debug {
    /// Immediate children of `dir` as `(directories, files)`; a missing
    /// directory lists as empty
    fn list_dir(&self, dir: &str) -> StorageResult<(Vec<String>, Vec<String>)>;

    /// Read the file at `path`
    fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Write data to `path`, creating parents
    fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;
}

/// Local filesystem media storage
#[derive(Debug, Clone)]
pub struct LocalMediaStorage {
    root: PathBuf,
}

impl LocalMediaStorage {
    /// Create a new local media storage
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn full_path(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl MediaStorage for LocalMediaStorage {
    fn list_dir(&self, dir: &str) -> StorageResult<(Vec<String>, Vec<String>)> {
        let full_path = self.full_path(dir)?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        if !full_path.is_dir() {
            return Ok((dirs, files));
        }

        for entry in fs::read_dir(&full_path)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                return Err(StorageError::InvalidPath(entry.path().display().to_string()));
            };

            if entry.file_type()?.is_dir() {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }

        dirs.sort();
        files.sort();
        Ok((dirs, files))
    }

    fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.full_path(path)?;

        fs::read(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::ObjectNotFound(path.to_string())
            } else {
                StorageError::IoError(e.to_string())
            }
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let full_path = self.full_path(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&full_path, data).map_err(|e| StorageError::IoError(e.to_string()))
    }
}
