//! Backup metadata document
//!
//! Location inside the archive: `metadata.json`
//!
//! ```json
//! {"schema_name": "acme", "domain": "acme.example.com", "skip_media": false, "backup_version": 2}
//! ```
//!
//! The document is the only cross-version surface of a backup. Fields may be
//! added, never repurposed; a reader seeing a `backup_version` newer than
//! [`BACKUP_VERSION`] must refuse the archive instead of guessing.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{ArchiveError, ArchiveResult};

/// Layout version written by this crate (plain tar with `schema.sql`)
pub const BACKUP_VERSION: u32 = 2;

/// Immutable facts about a captured backup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupMetadata {
    /// Namespace the dump was taken from
    pub schema_name: String,

    /// Tenant domain at backup time
    pub domain: String,

    /// Whether the media tree was left out of the archive
    pub skip_media: bool,

    /// Archive layout version
    pub backup_version: u32,

    /// RFC 3339 timestamp, absent in archives from older writers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl BackupMetadata {
    /// Creates metadata for a backup taken now
    pub fn new(schema_name: &str, domain: &str, skip_media: bool) -> Self {
        Self {
            schema_name: schema_name.to_string(),
            domain: domain.to_string(),
            skip_media,
            backup_version: BACKUP_VERSION,
            created_at: Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        }
    }

    /// Converts the metadata into a JSON object, ready for merging
    pub fn to_fields(&self) -> ArchiveResult<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ArchiveError::metadata_failed(
                "Backup metadata did not serialize to an object",
            )),
            Err(e) => Err(ArchiveError::metadata_failed(format!(
                "Failed to serialize backup metadata: {}",
                e
            ))),
        }
    }

    /// Deserializes metadata from JSON
    pub fn from_json(json: &str) -> ArchiveResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            ArchiveError::metadata_failed(format!("Failed to parse backup metadata: {}", e))
        })
    }

    /// Reads metadata from a file
    pub fn read_from_file(path: &Path) -> ArchiveResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ArchiveError::metadata_failed_with_source(
                format!("Failed to read metadata file: {}", path.display()),
                e,
            )
        })?;

        Self::from_json(&contents)
    }
}

/// Read-modify-write merge of `fields` into the JSON object at `path`.
///
/// A missing file starts from `{}`. Keys in `fields` win over existing ones.
pub fn merge_into_file(path: &Path, fields: Map<String, Value>) -> ArchiveResult<()> {
    let mut document = if path.exists() {
        let contents = fs::read_to_string(path)
            .map_err(|e| ArchiveError::metadata_failed_with_source(
                format!("Failed to read metadata file: {}", path.display()),
                e,
            ))?;

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(ArchiveError::metadata_failed(format!(
                    "Metadata file is not a JSON object: {}",
                    path.display()
                )))
            }
            Err(e) => {
                return Err(ArchiveError::metadata_failed(format!(
                    "Failed to parse metadata file {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    } else {
        Map::new()
    };

    document.extend(fields);

    let json = serde_json::to_string_pretty(&Value::Object(document)).map_err(|e| {
        ArchiveError::metadata_failed(format!("Failed to serialize metadata: {}", e))
    })?;

    let mut file = File::create(path).map_err(|e| {
        ArchiveError::metadata_failed_with_source(
            format!("Failed to create metadata file: {}", path.display()),
            e,
        )
    })?;

    file.write_all(json.as_bytes()).map_err(|e| {
        ArchiveError::metadata_failed_with_source(
            format!("Failed to write metadata file: {}", path.display()),
            e,
        )
    })?;

    file.sync_all()
        .map_err(|e| ArchiveError::io_error(format!("Failed to fsync {}", path.display()), e))
}
