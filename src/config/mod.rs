//! Tool configuration
//!
//! A JSON file (default `tenant-backup.json` in the working directory) with
//! every field optional:
//!
//! ```json
//! {
//!   "database": {"host": "db", "port": 5432, "user": "saleor", "dbname": "saleor"},
//!   "default_backup_bucket": "tenant-backups",
//!   "scratch_root": "/var/tmp",
//!   "tools": {"pg_dump": "pg_dump", "psql": "psql", "aws": "aws"},
//!   "archive_store": {"backend": "s3", "region": "eu-west-1"},
//!   "media": {"backend": "s3", "bucket": "media", "prefix": "media", "excludes": ["__sized__"]},
//!   "hooks": {"migrate": ["saleor", "migrate_schemas", "--schema={schema}"]}
//! }
//! ```
//!
//! Environment overrides are applied after the file: `DEFAULT_BACKUP_BUCKET_NAME`,
//! `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`, `PGDATABASE`.

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::database::{ConnectionParams, DEFAULT_SITE_TABLE};
use crate::media::DEFAULT_EXCLUDES;
use crate::storage::S3Settings;

/// Config file looked up when none is given explicitly
pub const DEFAULT_CONFIG_PATH: &str = "tenant-backup.json";

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
    /// Table holding the site record inside each tenant namespace
    pub site_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "saleor".to_string(),
            password: None,
            dbname: "saleor".to_string(),
            site_table: DEFAULT_SITE_TABLE.to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            dbname: self.dbname.clone(),
        }
    }
}

/// External executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub pg_dump: String,
    pub psql: String,
    pub aws: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pg_dump: "pg_dump".to_string(),
            psql: "psql".to_string(),
            aws: "aws".to_string(),
        }
    }
}

/// Backend for `s3://` archive locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStoreBackend {
    /// The real bucket, through the AWS SDK
    #[default]
    S3,
    /// `<root>/<bucket>/<key>` on the local filesystem
    Filesystem,
}

/// Where `s3://` archive locations are stored
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveStoreConfig {
    pub backend: ArchiveStoreBackend,
    /// Filesystem backend root
    pub root: Option<PathBuf>,
    /// S3 backend region, defaults to the AWS environment
    pub region: Option<String>,
    /// S3-compatible endpoint for the S3 backend
    pub endpoint_url: Option<String>,
}

impl ArchiveStoreConfig {
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
        }
    }
}

/// Media storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    #[default]
    Filesystem,
    S3,
}

/// Tenant media storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub backend: MediaBackend,
    /// Filesystem backend root; tenants live in `<root>/<domain>/`
    pub root: PathBuf,
    /// S3 backend bucket
    pub bucket: Option<String>,
    /// S3 backend key prefix
    pub prefix: String,
    /// Directory names never transferred
    pub excludes: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            backend: MediaBackend::Filesystem,
            root: PathBuf::from("media"),
            bucket: None,
            prefix: String::new(),
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Post-load commands; `{schema}` is replaced with the namespace.
/// An empty list disables the hook.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub migrate: Vec<String>,
    pub regenerate_thumbnails: Vec<String>,
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Bucket used by `s3:///key` locations
    #[serde(default)]
    pub default_backup_bucket: Option<String>,

    /// Parent of per-operation scratch directories
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub archive_store: ArchiveStoreConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub hooks: HooksConfig,
}

fn default_scratch_root() -> PathBuf {
    std::env::temp_dir()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            default_backup_bucket: None,
            scratch_root: default_scratch_root(),
            tools: ToolsConfig::default(),
            archive_store: ArchiveStoreConfig::default(),
            media: MediaConfig::default(),
            hooks: HooksConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from JSON
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json(&content)
    }

    /// Loads `explicit` (which must exist) or the default file (which may
    /// not), applies the process environment and validates.
    pub fn resolve(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(bucket) = lookup("DEFAULT_BACKUP_BUCKET_NAME") {
            self.default_backup_bucket = Some(bucket);
        }
        if let Some(host) = lookup("PGHOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("PGPORT") {
            self.database.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "PGPORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(user) = lookup("PGUSER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("PGPASSWORD") {
            self.database.password = Some(password);
        }
        if let Some(dbname) = lookup("PGDATABASE") {
            self.database.dbname = dbname;
        }
        Ok(())
    }

    /// Validates configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.dbname.is_empty() {
            return Err(ConfigError::Invalid(
                "database.dbname must not be empty".to_string(),
            ));
        }

        if self.database.port == 0 {
            return Err(ConfigError::Invalid("database.port must be > 0".to_string()));
        }

        if self.media.backend == MediaBackend::S3
            && self.media.bucket.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::Invalid(
                "media.bucket is required for the s3 media backend".to_string(),
            ));
        }

        if let Some(exclude) = self
            .media
            .excludes
            .iter()
            .find(|e| e.is_empty() || e.contains('/') || e.contains('\\'))
        {
            return Err(ConfigError::Invalid(format!(
                "media.excludes entries must be plain directory names, got {:?}",
                exclude
            )));
        }

        if self.archive_store.backend == ArchiveStoreBackend::Filesystem
            && self.archive_store.root.is_none()
        {
            return Err(ConfigError::Invalid(
                "archive_store.root is required for the filesystem archive store".to_string(),
            ));
        }

        Ok(())
    }
}
