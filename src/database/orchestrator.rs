//! Dump / drop / load orchestration
//!
//! - `dump` runs `pg_dump` for exactly one namespace with every identifier
//!   quoted, so the rewriter can find qualified names unambiguously
//! - `drop_namespace` is only called immediately before a `load`
//! - `load` feeds a SQL file to `psql`, stopping at the first error, then
//!   runs the migration hook for the namespace
//!
//! Connection parameters are read only after the data layer has been
//! initialized.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::connection::{ConnectionParams, Database};
use super::errors::DatabaseResult;
use super::namespace::Namespace;
use super::runner::{Invocation, ProcessRunner};

/// Placeholder substituted with the namespace in hook templates
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Steps that run after data arrives in a namespace
pub trait PostLoadHooks: Send + Sync + fmt::Debug {
    /// After a SQL dump has been loaded: bring the schema up to date
    fn after_load(&self, namespace: &Namespace) -> DatabaseResult<()>;

    /// After media has been uploaded: regenerate derived assets
    fn after_media(&self, namespace: &Namespace) -> DatabaseResult<()>;
}

/// Hooks that run configured argv templates; an empty template is skipped
#[derive(Debug)]
pub struct CommandHooks {
    runner: Arc<dyn ProcessRunner>,
    migrate: Vec<String>,
    regenerate_thumbnails: Vec<String>,
}

impl CommandHooks {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        migrate: Vec<String>,
        regenerate_thumbnails: Vec<String>,
    ) -> Self {
        Self {
            runner,
            migrate,
            regenerate_thumbnails,
        }
    }

    fn run_template(&self, template: &[String], namespace: &Namespace) -> DatabaseResult<()> {
        let Some((program, args)) = template.split_first() else {
            return Ok(());
        };

        let render = |part: &String| part.replace(SCHEMA_PLACEHOLDER, namespace.as_str());
        let invocation = Invocation::new(render(program)).args(args.iter().map(render));
        self.runner.run(&invocation)?;
        Ok(())
    }
}

impl PostLoadHooks for CommandHooks {
    fn after_load(&self, namespace: &Namespace) -> DatabaseResult<()> {
        self.run_template(&self.migrate, namespace)
    }

    fn after_media(&self, namespace: &Namespace) -> DatabaseResult<()> {
        self.run_template(&self.regenerate_thumbnails, namespace)
    }
}

/// Runs the external dump and load tools against one namespace at a time
#[derive(Debug, Clone)]
pub struct DumpOrchestrator {
    database: Arc<dyn Database>,
    runner: Arc<dyn ProcessRunner>,
    hooks: Arc<dyn PostLoadHooks>,
    pg_dump: String,
    psql: String,
}

impl DumpOrchestrator {
    pub fn new(
        database: Arc<dyn Database>,
        runner: Arc<dyn ProcessRunner>,
        hooks: Arc<dyn PostLoadHooks>,
        pg_dump: impl Into<String>,
        psql: impl Into<String>,
    ) -> Self {
        Self {
            database,
            runner,
            hooks,
            pg_dump: pg_dump.into(),
            psql: psql.into(),
        }
    }

    pub fn database(&self) -> &dyn Database {
        self.database.as_ref()
    }

    /// Connection parameters, initializing the connection first if needed
    fn connection(&self) -> DatabaseResult<ConnectionParams> {
        self.database.ensure_initialized()?;
        self.database.connection_params()
    }

    /// Writes a raw SQL dump of `namespace` to `output`
    pub fn dump(&self, namespace: &Namespace, output: &Path) -> DatabaseResult<()> {
        let params = self.connection()?;
        let invocation = Invocation::new(&self.pg_dump)
            .arg(format!("--dbname={}", params.conninfo()))
            .arg(format!("--schema={}", namespace.quoted()))
            .args(["--quote-all-identifiers", "--no-owner", "--no-privileges"])
            .arg(format!("--file={}", output.display()))
            .envs(params.env());

        self.runner.run(&invocation)?;
        Ok(())
    }

    /// Drops `namespace` with everything in it
    pub fn drop_namespace(&self, namespace: &Namespace) -> DatabaseResult<()> {
        self.database.drop_namespace(namespace)
    }

    /// Executes the SQL file at `dump`, then the migration hook
    pub fn load(&self, namespace: &Namespace, dump: &Path) -> DatabaseResult<()> {
        let params = self.connection()?;
        let invocation = Invocation::new(&self.psql)
            .args(["-X", "-q", "-v", "ON_ERROR_STOP=1"])
            .arg(format!("--dbname={}", params.conninfo()))
            .arg(format!("--file={}", dump.display()))
            .envs(params.env());

        self.runner.run(&invocation)?;
        self.hooks.after_load(namespace)
    }

    /// Runs the asset regeneration hook after a media upload
    pub fn regenerate_assets(&self, namespace: &Namespace) -> DatabaseResult<()> {
        self.hooks.after_media(namespace)
    }
}
