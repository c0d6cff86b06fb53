//! [`Database`] implemented with the `psql` client

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::connection::{sql_literal, ConnectionParams, Database};
use super::errors::{DatabaseError, DatabaseResult};
use super::namespace::{identifier_regex, Namespace};
use super::runner::{Invocation, ProcessRunner};
use crate::observability::{log_event_with_fields, Event};

/// Site table used when none is configured
pub const DEFAULT_SITE_TABLE: &str = "django_site";

/// Data layer issuing one `psql` process per query
#[derive(Debug)]
pub struct PsqlDatabase {
    runner: Arc<dyn ProcessRunner>,
    psql: String,
    params: ConnectionParams,
    site_table: String,
    initialized: AtomicBool,
}

impl PsqlDatabase {
    pub fn new(runner: Arc<dyn ProcessRunner>, psql: impl Into<String>, params: ConnectionParams) -> Self {
        Self {
            runner,
            psql: psql.into(),
            params,
            site_table: DEFAULT_SITE_TABLE.to_string(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Overrides the table holding the site record
    pub fn with_site_table(mut self, table: &str) -> DatabaseResult<Self> {
        if !identifier_regex().is_match(table) {
            return Err(DatabaseError::InvalidNamespace(table.to_string()));
        }
        self.site_table = table.to_string();
        Ok(self)
    }

    /// Runs one statement, returning unaligned tuples-only output
    fn query(&self, sql: &str) -> DatabaseResult<String> {
        let invocation = Invocation::new(&self.psql)
            .args(["-X", "-q", "-t", "-A", "-v", "ON_ERROR_STOP=1"])
            .arg(format!("--dbname={}", self.params.conninfo()))
            .args(["-c", sql])
            .envs(self.params.env());

        let output = self.runner.run(&invocation)?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(output.trim().to_string())
    }

    fn site_table(&self, namespace: &Namespace) -> String {
        format!("{}.\"{}\"", namespace.quoted(), self.site_table)
    }
}

impl Database for PsqlDatabase {
    fn ensure_initialized(&self) -> DatabaseResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        match self.query("SELECT 1")?.as_str() {
            "1" => Ok(()),
            other => Err(DatabaseError::UnexpectedResult(other.to_string())),
        }
    }

    fn connection_params(&self) -> DatabaseResult<ConnectionParams> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(DatabaseError::NotInitialized);
        }
        Ok(self.params.clone())
    }

    fn namespace_exists(&self, namespace: &Namespace) -> DatabaseResult<bool> {
        let sql = format!(
            "SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = {}",
            sql_literal(namespace.as_str())
        );
        Ok(self.query(&sql)? == "1")
    }

    fn drop_namespace(&self, namespace: &Namespace) -> DatabaseResult<()> {
        self.query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", namespace.quoted()))?;
        log_event_with_fields(Event::NamespaceDropped, &[("namespace", namespace.as_str())]);
        Ok(())
    }

    fn site_domain(&self, namespace: &Namespace) -> DatabaseResult<Option<String>> {
        let sql = format!(
            "SELECT domain FROM {} ORDER BY id LIMIT 1",
            self.site_table(namespace)
        );
        let output = self.query(&sql)?;
        Ok(if output.is_empty() { None } else { Some(output) })
    }

    fn set_site_domain(&self, namespace: &Namespace, domain: &str) -> DatabaseResult<()> {
        let sql = format!(
            "UPDATE {} SET domain = {}",
            self.site_table(namespace),
            sql_literal(domain)
        );
        self.query(&sql)?;
        Ok(())
    }
}
