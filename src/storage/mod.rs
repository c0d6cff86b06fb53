//! # Storage
//!
//! Where archives and tenant media live outside the scratch directory:
//!
//! - [`ObjectStore`]: bucket/key archive storage (AWS SDK or filesystem)
//! - [`MediaStorage`]: relative-path media tree used by the walking transfer

pub mod errors;
pub mod media;
pub mod object;

pub use errors::{StorageError, StorageResult};
pub use media::{LocalMediaStorage, MediaStorage};
pub use object::{FsObjectStore, ObjectStore, S3ObjectStore, S3Settings};
