//! tenant_backup - backup, restore and rollback for schema-isolated tenants
//!
//! A tenant's data lives in its own database schema plus a media tree under
//! its domain. This crate moves both in and out of a tar archive:
//!
//! - [`commands`]: the backup, restore and rollback state machines
//! - [`archive`]: scratch directory lifecycle and the archive container
//! - [`rewriter`]: schema-qualified identifier rewriting over SQL dumps
//! - [`database`]: namespaces, the dump/load tools and the data layer
//! - [`media`] and [`storage`]: media transfer and archive object stores

pub mod archive;
pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod location;
pub mod media;
pub mod observability;
pub mod rewriter;
pub mod storage;
