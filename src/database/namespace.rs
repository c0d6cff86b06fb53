//! Namespaces, tenants and the scoped active-namespace session

use std::cell::RefCell;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::errors::{DatabaseError, DatabaseResult};

/// Validated identifier of an isolated data partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validates `name` as a PostgreSQL schema identifier.
    ///
    /// Names reserved for the system catalog (`pg_*`) are rejected.
    pub fn new(name: &str) -> DatabaseResult<Self> {
        if !identifier_regex().is_match(name) || name.starts_with("pg_") {
            return Err(DatabaseError::InvalidNamespace(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form used in SQL text
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]{0,62}$").expect("valid static regex"))
}

/// A tenant: its public domain and the namespace holding its rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub domain_url: String,
    pub namespace: Namespace,
}

impl Tenant {
    /// Creates a tenant. Without an explicit schema the namespace is the
    /// first label of the lower-cased domain.
    pub fn new(domain_url: &str, schema: Option<&str>) -> DatabaseResult<Self> {
        let domain_url = domain_url.trim().to_lowercase();
        let namespace = match schema {
            Some(schema) => Namespace::new(schema)?,
            None => Namespace::new(domain_url.split('.').next().unwrap_or_default())?,
        };

        Ok(Self {
            domain_url,
            namespace,
        })
    }
}

/// Holder of the "currently active namespace".
///
/// The only way to change it is [`Session::enter`], whose guard puts the
/// previous value back when dropped.
///
/// The pointer is advisory. Every [`super::Database`] call and every
/// `pg_dump`/`psql` invocation names its namespace explicitly, so nothing
/// in the data layer reads it. Commands enter a tenant's namespace for the
/// duration of a run and callers observe the restored value afterwards.
#[derive(Debug, Default)]
pub struct Session {
    active: RefCell<Option<Namespace>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with `namespace` already active
    pub fn with_active(namespace: Namespace) -> Self {
        Self {
            active: RefCell::new(Some(namespace)),
        }
    }

    pub fn active(&self) -> Option<Namespace> {
        self.active.borrow().clone()
    }

    /// Makes `namespace` active until the returned guard is dropped
    pub fn enter(&self, namespace: Namespace) -> NamespaceGuard<'_> {
        let previous = self.active.replace(Some(namespace));
        NamespaceGuard {
            session: self,
            previous,
        }
    }
}

/// Restores the previously active namespace on drop
#[derive(Debug)]
pub struct NamespaceGuard<'a> {
    session: &'a Session,
    previous: Option<Namespace>,
}

impl Drop for NamespaceGuard<'_> {
    fn drop(&mut self) {
        self.session.active.replace(self.previous.take());
    }
}
