//! Data layer interface and connection parameters

use std::fmt;

use super::errors::DatabaseResult;
use super::namespace::Namespace;

/// Parameters external tools need to reach the database
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
}

impl ConnectionParams {
    /// libpq keyword/value connection string, password excluded
    pub fn conninfo(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if !self.host.is_empty() {
            parts.push(format!("host={}", conninfo_value(&self.host)));
        }
        parts.push(format!("port={}", self.port));
        if !self.user.is_empty() {
            parts.push(format!("user={}", conninfo_value(&self.user)));
        }
        parts.push(format!("dbname={}", conninfo_value(&self.dbname)));
        parts.join(" ")
    }

    /// Environment for tool invocations; the password never appears in argv
    pub fn env(&self) -> Vec<(String, String)> {
        match &self.password {
            Some(password) => vec![("PGPASSWORD".to_string(), password.clone())],
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("dbname", &self.dbname)
            .finish()
    }
}

/// Quotes a conninfo value when it is empty or contains spaces, quotes or
/// backslashes
fn conninfo_value(value: &str) -> String {
    let plain = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if plain {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Quotes a SQL string literal
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The operations the backup pipeline needs from the data layer.
///
/// Every operation names its namespace explicitly.
pub trait Database: Send + Sync + fmt::Debug {
    /// Issues a trivial query if nothing has run yet on the connection, so
    /// its parameters are populated
    fn ensure_initialized(&self) -> DatabaseResult<()>;

    /// Raw connection parameters; fails with `NotInitialized` before
    /// [`Database::ensure_initialized`] or any other query
    fn connection_params(&self) -> DatabaseResult<ConnectionParams>;

    fn namespace_exists(&self, namespace: &Namespace) -> DatabaseResult<bool>;

    /// Irreversibly removes the namespace and everything in it
    fn drop_namespace(&self, namespace: &Namespace) -> DatabaseResult<()>;

    /// Domain of the site record inside `namespace`, if there is one
    fn site_domain(&self, namespace: &Namespace) -> DatabaseResult<Option<String>>;

    fn set_site_domain(&self, namespace: &Namespace, domain: &str) -> DatabaseResult<()>;
}
