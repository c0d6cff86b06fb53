//! Archive manager
//!
//! A [`TenantArchive`] is the working unit of one backup or restore. It owns a
//! private scratch directory holding:
//!
//! ```text
//! <scratch_root>/<id>/
//! ├── schema.sql       raw SQL dump
//! ├── metadata.json    BackupMetadata
//! └── media/           tenant media tree (absent when media was skipped)
//! ```
//!
//! Lifecycle: `Created → Started → Archived | Extracted → Stopped`.
//! The scratch directory is removed by [`TenantArchive::stop`], and by `Drop`
//! if stop was never called, so every exit path releases it.

mod container;
mod errors;
mod metadata;

pub use container::{read_container, write_container, ArchiveFormat};
pub use errors::{ArchiveError, ArchiveErrorCode, ArchiveResult, Severity};
pub use metadata::{merge_into_file, BackupMetadata, BACKUP_VERSION};

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event};

/// Archive member holding the raw SQL dump
pub const SCHEMA_MEMBER: &str = "schema.sql";
/// Archive member holding the metadata document
pub const METADATA_MEMBER: &str = "metadata.json";
/// Archive member holding the media tree
pub const MEDIA_MEMBER: &str = "media";
/// Fixture member of the version 1 layout
pub const LEGACY_SCHEMA_MEMBER: &str = "schema.json";

/// Default gzip level for the compressed container
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Lifecycle state of a [`TenantArchive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Created,
    Started,
    Archived,
    Extracted,
    Stopped,
}

/// Scratch-directory bound working unit for one operation
#[derive(Debug)]
pub struct TenantArchive {
    scratch_dir: PathBuf,
    state: ArchiveState,
    compression_level: u32,
    /// Containers written to the default destination, removed on stop
    intermediates: Vec<PathBuf>,
}

impl TenantArchive {
    /// Creates an archive with a fresh scratch directory name under `scratch_root`
    pub fn new(scratch_root: &Path) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self::with_scratch_dir(scratch_root.join(format!("tenant-backup-{}", id)))
    }

    /// Creates an archive bound to an explicit scratch directory
    pub fn with_scratch_dir(scratch_dir: PathBuf) -> Self {
        Self {
            scratch_dir,
            state: ArchiveState::Created,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            intermediates: Vec::new(),
        }
    }

    /// Sets the gzip level used by [`ArchiveFormat::TarGz`]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn schema_dump_path(&self) -> PathBuf {
        self.scratch_dir.join(SCHEMA_MEMBER)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.scratch_dir.join(METADATA_MEMBER)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.scratch_dir.join(MEDIA_MEMBER)
    }

    /// Path of the version 1 fixture, present only in extracted v1 archives
    pub fn legacy_schema_path(&self) -> PathBuf {
        self.scratch_dir.join(LEGACY_SCHEMA_MEMBER)
    }

    /// Where an extracted member lands inside the scratch directory
    pub fn member_destination(&self, member: &str) -> PathBuf {
        self.scratch_dir.join(member)
    }

    /// Sibling of the scratch directory: `<scratch>.tar` or `<scratch>.tar.gz`
    pub fn default_archive_path(&self, format: ArchiveFormat) -> PathBuf {
        let mut path = self.scratch_dir.clone().into_os_string();
        path.push(".");
        path.push(format.extension());
        PathBuf::from(path)
    }

    /// Creates the scratch directory, owner-only
    pub fn start(&mut self) -> ArchiveResult<()> {
        if self.state != ArchiveState::Created {
            return Err(ArchiveError::invalid_state(format!(
                "Archive can only be started once (state: {:?})",
                self.state
            )));
        }

        create_private_dir(&self.scratch_dir).map_err(|e| {
            ArchiveError::io_error(
                format!(
                    "Failed to create scratch directory: {}",
                    self.scratch_dir.display()
                ),
                e,
            )
        })?;

        self.state = ArchiveState::Started;
        Ok(())
    }

    /// Merges `fields` into metadata.json
    pub fn add_metadata(&self, fields: Map<String, Value>) -> ArchiveResult<()> {
        self.require_active("add_metadata")?;
        merge_into_file(&self.metadata_path(), fields)
    }

    /// Reads metadata.json, `None` if the archive carries none (version 1)
    pub fn read_metadata(&self) -> ArchiveResult<Option<BackupMetadata>> {
        self.require_active("read_metadata")?;
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        BackupMetadata::read_from_file(&path).map(Some)
    }

    /// Builds the plain tar container, see [`TenantArchive::archive_all_with`]
    pub fn archive_all(&mut self, destination: Option<&Path>) -> ArchiveResult<PathBuf> {
        self.archive_all_with(destination, ArchiveFormat::Tar)
    }

    /// Builds the container with members `schema.sql`, `metadata.json` and,
    /// when the directory exists, `media`, in that order.
    ///
    /// Without a destination the container is written next to the scratch
    /// directory and removed again on [`TenantArchive::stop`].
    pub fn archive_all_with(
        &mut self,
        destination: Option<&Path>,
        format: ArchiveFormat,
    ) -> ArchiveResult<PathBuf> {
        self.require_active("archive_all")?;

        let output = match destination {
            Some(path) => path.to_path_buf(),
            None => self.default_archive_path(format),
        };

        let mut members = vec![
            (SCHEMA_MEMBER, self.schema_dump_path()),
            (METADATA_MEMBER, self.metadata_path()),
        ];
        let media_dir = self.media_dir();
        if media_dir.is_dir() {
            members.push((MEDIA_MEMBER, media_dir));
        }

        if destination.is_none() {
            self.intermediates.push(output.clone());
        }

        write_container(&output, format, self.compression_level, &members)?;

        log_event_with_fields(
            Event::ArchiveCreated,
            &[
                ("path", &output.display().to_string()),
                ("format", format.extension()),
                ("members", &members.len().to_string()),
            ],
        );

        self.state = ArchiveState::Archived;
        Ok(output)
    }

    /// Unpacks the container at `source` into the scratch directory
    pub fn extract_all(&mut self, source: &Path) -> ArchiveResult<ArchiveFormat> {
        let file = File::open(source).map_err(|e| {
            ArchiveError::io_error(
                format!("Failed to open backup archive: {}", source.display()),
                e,
            )
        })?;
        self.extract_from_reader(file)
    }

    /// Unpacks a container read from `reader` into the scratch directory.
    /// Plain and gzip containers are both accepted.
    pub fn extract_from_reader<R: Read>(&mut self, reader: R) -> ArchiveResult<ArchiveFormat> {
        self.require_active("extract_all")?;

        let format = read_container(reader, &self.scratch_dir, |member| {
            let destination = self.member_destination(member);
            log_event_with_fields(
                Event::ArchiveExtract,
                &[
                    ("member", member),
                    ("destination", &destination.display().to_string()),
                ],
            );
        })?;

        self.state = ArchiveState::Extracted;
        Ok(format)
    }

    /// Removes the scratch directory and intermediate containers.
    /// Idempotent; removal errors are ignored.
    pub fn stop(&mut self) {
        if matches!(self.state, ArchiveState::Created | ArchiveState::Stopped) {
            self.state = ArchiveState::Stopped;
            return;
        }

        let _ = fs::remove_dir_all(&self.scratch_dir);
        for path in self.intermediates.drain(..) {
            let _ = fs::remove_file(&path);
        }

        log_event_with_fields(
            Event::ScratchRemoved,
            &[("path", &self.scratch_dir.display().to_string())],
        );
        self.state = ArchiveState::Stopped;
    }

    fn require_active(&self, operation: &str) -> ArchiveResult<()> {
        match self.state {
            ArchiveState::Started | ArchiveState::Archived | ArchiveState::Extracted => Ok(()),
            state => Err(ArchiveError::invalid_state(format!(
                "{} requires a started archive (state: {:?})",
                operation, state
            ))),
        }
    }
}

impl Drop for TenantArchive {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    fs::DirBuilder::new().create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn started(root: &Path) -> TenantArchive {
        let mut archive = TenantArchive::new(root);
        archive.start().unwrap();
        archive
    }

    #[test]
    fn test_start_creates_private_dir() {
        let root = TempDir::new().unwrap();
        let archive = started(root.path());

        assert!(archive.scratch_dir().is_dir());
        assert_eq!(archive.state(), ArchiveState::Started);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(archive.scratch_dir()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_start_fails_on_collision() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("taken");
        fs::create_dir(&dir).unwrap();

        let mut archive = TenantArchive::with_scratch_dir(dir.clone());
        let err = archive.start().unwrap_err();
        assert_eq!(err.code(), ArchiveErrorCode::TenantArchiveIo);

        // never started, so stop must not remove someone else's directory
        drop(archive);
        assert!(dir.exists());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let root = TempDir::new().unwrap();
        let mut archive = started(root.path());
        let err = archive.start().unwrap_err();
        assert_eq!(err.code(), ArchiveErrorCode::TenantArchiveState);
    }

    #[test]
    fn test_stop_removes_scratch_and_is_idempotent() {
        let root = TempDir::new().unwrap();
        let mut archive = started(root.path());
        let dir = archive.scratch_dir().to_path_buf();
        fs::write(archive.schema_dump_path(), "--").unwrap();

        archive.stop();
        assert!(!dir.exists());
        archive.stop();
        assert_eq!(archive.state(), ArchiveState::Stopped);
    }

    #[test]
    fn test_stop_tolerates_already_removed_dir() {
        let root = TempDir::new().unwrap();
        let mut archive = started(root.path());
        fs::remove_dir_all(archive.scratch_dir()).unwrap();
        archive.stop();
    }

    #[test]
    fn test_drop_removes_scratch() {
        let root = TempDir::new().unwrap();
        let dir = {
            let archive = started(root.path());
            archive.scratch_dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_add_metadata_merges() {
        let root = TempDir::new().unwrap();
        let archive = started(root.path());

        let mut first = Map::new();
        first.insert("schema_name".into(), json!("acme"));
        archive.add_metadata(first).unwrap();

        let metadata = BackupMetadata::new("acme", "acme.example.com", true);
        archive.add_metadata(metadata.to_fields().unwrap()).unwrap();

        assert_eq!(archive.read_metadata().unwrap(), Some(metadata));
    }

    #[test]
    fn test_add_metadata_requires_start() {
        let root = TempDir::new().unwrap();
        let archive = TenantArchive::new(root.path());
        assert!(archive.add_metadata(Map::new()).is_err());
    }

    #[test]
    fn test_default_archive_path_is_sibling() {
        let archive = TenantArchive::with_scratch_dir(PathBuf::from("/tmp/scratch"));
        assert_eq!(
            archive.default_archive_path(ArchiveFormat::Tar),
            PathBuf::from("/tmp/scratch.tar")
        );
        assert_eq!(
            archive.default_archive_path(ArchiveFormat::TarGz),
            PathBuf::from("/tmp/scratch.tar.gz")
        );
    }

    #[test]
    fn test_member_destination_is_per_member() {
        let archive = TenantArchive::with_scratch_dir(PathBuf::from("/tmp/scratch"));
        assert_eq!(
            archive.member_destination("schema.sql"),
            PathBuf::from("/tmp/scratch/schema.sql")
        );
        assert_eq!(
            archive.member_destination("media/products/a.jpg"),
            PathBuf::from("/tmp/scratch/media/products/a.jpg")
        );
    }

    #[test]
    fn test_archive_then_extract() {
        let root = TempDir::new().unwrap();
        let mut source = started(root.path());
        fs::write(source.schema_dump_path(), "CREATE SCHEMA \"acme\";\n").unwrap();
        source
            .add_metadata(BackupMetadata::new("acme", "acme.example.com", false).to_fields().unwrap())
            .unwrap();
        fs::create_dir_all(source.media_dir().join("products")).unwrap();
        fs::write(source.media_dir().join("products/a.jpg"), b"jpeg").unwrap();

        let output = source.archive_all(None).unwrap();
        assert_eq!(output, source.default_archive_path(ArchiveFormat::Tar));
        assert_eq!(source.state(), ArchiveState::Archived);

        let mut target = started(root.path());
        let format = target.extract_all(&output).unwrap();

        assert_eq!(format, ArchiveFormat::Tar);
        assert_eq!(
            fs::read_to_string(target.schema_dump_path()).unwrap(),
            "CREATE SCHEMA \"acme\";\n"
        );
        assert_eq!(fs::read(target.media_dir().join("products/a.jpg")).unwrap(), b"jpeg");
        assert_eq!(target.read_metadata().unwrap().unwrap().schema_name, "acme");

        // intermediate container goes away with the scratch directory
        source.stop();
        assert!(!output.exists());
    }

    #[test]
    fn test_explicit_destination_survives_stop() {
        let root = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let destination = out_dir.path().join("acme.tar");

        let mut archive = started(root.path());
        fs::write(archive.schema_dump_path(), "--").unwrap();
        archive.add_metadata(Map::new()).unwrap();
        archive.archive_all(Some(&destination)).unwrap();
        archive.stop();

        assert!(destination.exists());
    }

    #[test]
    fn test_compressed_archive() {
        let root = TempDir::new().unwrap();
        let mut source = started(root.path());
        fs::write(source.schema_dump_path(), "--").unwrap();
        source.add_metadata(Map::new()).unwrap();

        let output = source.archive_all_with(None, ArchiveFormat::TarGz).unwrap();
        assert!(output.to_string_lossy().ends_with(".tar.gz"));

        let mut target = started(root.path());
        assert_eq!(target.extract_all(&output).unwrap(), ArchiveFormat::TarGz);
        assert!(!target.media_dir().exists());
    }

    #[test]
    fn test_read_metadata_absent() {
        let root = TempDir::new().unwrap();
        let archive = started(root.path());
        assert_eq!(archive.read_metadata().unwrap(), None);
    }
}
