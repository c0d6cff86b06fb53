//! Data layer access for the backup pipeline
//!
//! - [`Namespace`] / [`Tenant`]: validated identifiers
//! - [`Session`]: the scoped "active namespace" pointer
//! - [`Database`]: the queries the pipeline issues directly
//! - [`ProcessRunner`]: external tool execution
//! - [`DumpOrchestrator`]: pg_dump / psql sequencing and post-load hooks

mod connection;
mod errors;
mod namespace;
mod orchestrator;
mod psql;
mod runner;

pub use connection::{ConnectionParams, Database};
pub use errors::{DatabaseError, DatabaseResult};
pub use namespace::{Namespace, NamespaceGuard, Session, Tenant};
pub use orchestrator::{CommandHooks, DumpOrchestrator, PostLoadHooks, SCHEMA_PLACEHOLDER};
pub use psql::{PsqlDatabase, DEFAULT_SITE_TABLE};
pub use runner::{Invocation, ProcessRunner, SystemRunner};
