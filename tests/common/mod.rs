//! Shared fixtures for command-level tests
//!
//! - `FakeCluster`: an in-memory database that is also the process runner,
//!   so pg_dump/psql invocations read and write its namespaces
//! - `FailingMedia` / `FailingObjectStore`: backends that fail on demand
//! - `Harness`: a wired `CommandContext` over temp directories
//! - helpers for dumps, media trees and archive member listings

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use tenant_backup::commands::CommandContext;
use tenant_backup::database::{
    ConnectionParams, Database, DatabaseError, DatabaseResult, DumpOrchestrator, Invocation,
    Namespace, PostLoadHooks, ProcessRunner, Session, Tenant,
};
use tenant_backup::location::ObjectRef;
use tenant_backup::media::{MediaTransfer, WalkingTransfer};
use tenant_backup::storage::{
    FsObjectStore, LocalMediaStorage, ObjectStore, StorageError, StorageResult,
};

const SITE_MARKER: &str = "-- site_domain: ";

// =============================================================================
// Fake database + process runner
// =============================================================================

/// Namespaces held as the SQL text that created them
#[derive(Debug, Default)]
pub struct FakeCluster {
    namespaces: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Vec<Invocation>>,
    drops: Mutex<Vec<String>>,
    failing_calls: Mutex<BTreeSet<usize>>,
    site_domain_fails: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, namespace: &str, sql: &str) {
        self.namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string(), sql.to_string());
    }

    pub fn contents(&self, namespace: &str) -> Option<String> {
        self.namespaces.lock().unwrap().get(namespace).cloned()
    }

    pub fn drops(&self) -> Vec<String> {
        self.drops.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }

    /// Makes the `n`th external process call from now (1-based) fail
    pub fn fail_call_from_now(&self, n: usize) {
        let base = self.calls.lock().unwrap().len();
        self.failing_calls.lock().unwrap().insert(base + n);
    }

    /// Makes every site record lookup fail
    pub fn fail_site_domain(&self) {
        self.site_domain_fails.store(true, Ordering::SeqCst);
    }

    fn flag(invocation: &Invocation, name: &str) -> Option<String> {
        let prefix = format!("--{}=", name);
        invocation
            .args
            .iter()
            .find_map(|arg| arg.strip_prefix(&prefix).map(str::to_string))
    }

    fn tool_failed(program: &str, stderr: &str) -> DatabaseError {
        DatabaseError::ToolFailed {
            program: program.to_string(),
            status: "exit status: 3".to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn pg_dump(&self, invocation: &Invocation) -> DatabaseResult<String> {
        let schema = Self::flag(invocation, "schema").unwrap_or_default();
        let namespace = schema.trim_matches('"');
        let file = Self::flag(invocation, "file").unwrap_or_default();

        let sql = self.contents(namespace).ok_or_else(|| {
            Self::tool_failed(
                "pg_dump",
                &format!("pg_dump: error: no matching schemas were found for pattern \"{}\"", namespace),
            )
        })?;

        fs::write(&file, sql)?;
        Ok(String::new())
    }

    fn psql(&self, invocation: &Invocation) -> DatabaseResult<String> {
        let file = Self::flag(invocation, "file").unwrap_or_default();
        let sql = fs::read_to_string(&file)?;

        let namespace = created_schema(&sql)
            .ok_or_else(|| Self::tool_failed("psql", "ERROR: no CREATE SCHEMA in input"))?;

        let mut namespaces = self.namespaces.lock().unwrap();
        if namespaces.contains_key(&namespace) {
            return Err(Self::tool_failed(
                "psql",
                &format!("ERROR: schema \"{}\" already exists", namespace),
            ));
        }
        namespaces.insert(namespace, sql);
        Ok(String::new())
    }
}

impl ProcessRunner for FakeCluster {
    fn run(&self, invocation: &Invocation) -> DatabaseResult<String> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.clone());
            calls.len()
        };

        if self.failing_calls.lock().unwrap().contains(&index) {
            return Err(Self::tool_failed(
                &invocation.program,
                &format!("ERROR: injected failure in call {}", index),
            ));
        }

        match invocation.program.as_str() {
            "pg_dump" => self.pg_dump(invocation),
            "psql" => self.psql(invocation),
            _ => Ok(String::new()),
        }
    }
}

impl Database for FakeCluster {
    fn ensure_initialized(&self) -> DatabaseResult<()> {
        Ok(())
    }

    fn connection_params(&self) -> DatabaseResult<ConnectionParams> {
        Ok(ConnectionParams {
            host: "localhost".to_string(),
            port: 5432,
            user: "saleor".to_string(),
            password: None,
            dbname: "saleor".to_string(),
        })
    }

    fn namespace_exists(&self, namespace: &Namespace) -> DatabaseResult<bool> {
        Ok(self.namespaces.lock().unwrap().contains_key(namespace.as_str()))
    }

    fn drop_namespace(&self, namespace: &Namespace) -> DatabaseResult<()> {
        self.drops.lock().unwrap().push(namespace.as_str().to_string());
        self.namespaces.lock().unwrap().remove(namespace.as_str());
        Ok(())
    }

    fn site_domain(&self, namespace: &Namespace) -> DatabaseResult<Option<String>> {
        if self.site_domain_fails.load(Ordering::SeqCst) {
            return Err(Self::tool_failed("psql", "ERROR: relation \"django_site\" does not exist"));
        }
        Ok(self
            .contents(namespace.as_str())
            .and_then(|sql| site_domain_of(&sql)))
    }

    fn set_site_domain(&self, namespace: &Namespace, domain: &str) -> DatabaseResult<()> {
        let mut namespaces = self.namespaces.lock().unwrap();
        let sql = namespaces
            .get_mut(namespace.as_str())
            .ok_or_else(|| DatabaseError::NamespaceNotFound(namespace.as_str().to_string()))?;

        *sql = sql
            .lines()
            .map(|line| {
                if line.starts_with(SITE_MARKER) {
                    format!("{}{}", SITE_MARKER, domain)
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Default)]
pub struct NoHooks;

impl PostLoadHooks for NoHooks {
    fn after_load(&self, _namespace: &Namespace) -> DatabaseResult<()> {
        Ok(())
    }

    fn after_media(&self, _namespace: &Namespace) -> DatabaseResult<()> {
        Ok(())
    }
}

fn created_schema(sql: &str) -> Option<String> {
    sql.lines().find_map(|line| {
        let rest = line.strip_prefix("CREATE SCHEMA \"")?;
        rest.split('"').next().map(str::to_string)
    })
}

pub fn site_domain_of(sql: &str) -> Option<String> {
    sql.lines()
        .find_map(|line| line.strip_prefix(SITE_MARKER))
        .map(str::to_string)
}

// =============================================================================
// Failing backends
// =============================================================================

/// Media backend that fails in the chosen directions and transfers nothing
/// otherwise
#[derive(Debug, Default)]
pub struct FailingMedia {
    pub download: bool,
    pub upload: bool,
}

impl FailingMedia {
    pub fn on_download() -> Arc<dyn MediaTransfer> {
        Arc::new(Self {
            download: true,
            upload: false,
        })
    }

    pub fn on_upload() -> Arc<dyn MediaTransfer> {
        Arc::new(Self {
            download: false,
            upload: true,
        })
    }

    fn outcome(fails: bool) -> StorageResult<usize> {
        if fails {
            Err(StorageError::IoError("media backend unavailable".to_string()))
        } else {
            Ok(0)
        }
    }
}

impl MediaTransfer for FailingMedia {
    fn download(&self, _tenant: &Tenant, _destination: &Path) -> StorageResult<usize> {
        Self::outcome(self.download)
    }

    fn upload(&self, _tenant: &Tenant, _source: &Path) -> StorageResult<usize> {
        Self::outcome(self.upload)
    }
}

/// Media download that succeeds but leaves a directory where the backup's
/// metadata.json must be written
#[derive(Debug, Default)]
pub struct MetadataBlockingMedia;

impl MetadataBlockingMedia {
    pub fn shared() -> Arc<dyn MediaTransfer> {
        Arc::new(Self)
    }
}

impl MediaTransfer for MetadataBlockingMedia {
    fn download(&self, _tenant: &Tenant, destination: &Path) -> StorageResult<usize> {
        fs::create_dir_all(destination.with_file_name("metadata.json"))?;
        Ok(0)
    }

    fn upload(&self, _tenant: &Tenant, _source: &Path) -> StorageResult<usize> {
        Ok(0)
    }
}

/// Filesystem object store whose puts or gets are refused
#[derive(Debug)]
pub struct FailingObjectStore {
    inner: FsObjectStore,
    pub fail_put: bool,
    pub fail_get: bool,
}

impl FailingObjectStore {
    pub fn new(root: &Path, fail_put: bool, fail_get: bool) -> Arc<dyn ObjectStore> {
        Arc::new(Self {
            inner: FsObjectStore::new(root.to_path_buf()),
            fail_put,
            fail_get,
        })
    }
}

impl ObjectStore for FailingObjectStore {
    fn put(&self, object: &ObjectRef, source: &Path, content_type: &str) -> StorageResult<()> {
        if self.fail_put {
            return Err(StorageError::TransferFailed(format!("AccessDenied: {}", object)));
        }
        self.inner.put(object, source, content_type)
    }

    fn get(&self, object: &ObjectRef, destination: &Path) -> StorageResult<Option<String>> {
        if self.fail_get {
            return Err(StorageError::TransferFailed(format!("AccessDenied: {}", object)));
        }
        self.inner.get(object, destination)
    }
}

// =============================================================================
// Dumps
// =============================================================================

/// A quote-all-identifiers dump of `namespace` with `rows` product rows,
/// touching every qualified statement prefix
pub fn sample_dump(namespace: &str, domain: &str, rows: usize) -> String {
    let ns = format!("\"{}\"", namespace);
    let mut sql = String::new();

    sql.push_str("--\n-- PostgreSQL database dump\n--\n\n");
    sql.push_str(&format!("{}{}\n\n", SITE_MARKER, domain));
    sql.push_str(&format!("CREATE SCHEMA {};\n", ns));
    sql.push_str(&format!("ALTER SCHEMA {} OWNER TO \"saleor\";\n\n", ns));
    sql.push_str(&format!(
        "CREATE TABLE {}.\"product_product\" (\n    \"id\" integer NOT NULL,\n    \"name\" character varying(250) NOT NULL\n);\n\n",
        ns
    ));
    sql.push_str(&format!(
        "CREATE SEQUENCE {}.\"product_product_id_seq\"\n    START WITH 1\n    INCREMENT BY 1;\n",
        ns
    ));
    sql.push_str(&format!(
        "ALTER SEQUENCE {ns}.\"product_product_id_seq\" OWNED BY {ns}.\"product_product\".\"id\";\n",
        ns = ns
    ));
    sql.push_str(&format!(
        "ALTER TABLE ONLY {ns}.\"product_product\" ALTER COLUMN \"id\" SET DEFAULT \"nextval\"('{ns}.\"product_product_id_seq\"'::\"regclass\");\n\n",
        ns = ns
    ));
    sql.push_str(&format!(
        "COPY {}.\"product_product\" (\"id\", \"name\") FROM stdin;\n",
        ns
    ));
    for id in 1..=rows {
        sql.push_str(&format!("{}\tProduct {}\n", id, id));
    }
    sql.push_str("\\.\n\n");
    sql.push_str(&format!(
        "SELECT pg_catalog.setval('{}.\"product_product_id_seq\"', {}, true);\n\n",
        ns, rows
    ));
    sql.push_str(&format!(
        "ALTER TABLE ONLY {}.\"product_product\"\n    ADD CONSTRAINT \"product_product_pkey\" PRIMARY KEY (\"id\");\n",
        ns
    ));
    sql.push_str(&format!(
        "CREATE INDEX \"product_product_name_idx\" ON {}.\"product_product\" USING \"btree\" (\"name\");\n",
        ns
    ));
    sql.push_str(&format!(
        "ALTER TABLE {ns}.\"product_variant\" ADD CONSTRAINT \"variant_product_fk\" FOREIGN KEY (\"product_id\") REFERENCES {ns}.\"product_product\"(\"id\");\n",
        ns = ns
    ));
    sql
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub scratch: TempDir,
    pub media_root: TempDir,
    pub object_root: TempDir,
    pub out: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            cluster: FakeCluster::new(),
            scratch: TempDir::new().unwrap(),
            media_root: TempDir::new().unwrap(),
            object_root: TempDir::new().unwrap(),
            out: TempDir::new().unwrap(),
        }
    }

    pub fn context(&self, tenant: Option<Tenant>) -> CommandContext {
        self.context_with_session(tenant, Session::new())
    }

    pub fn context_with_session(&self, tenant: Option<Tenant>, session: Session) -> CommandContext {
        let orchestrator = DumpOrchestrator::new(
            self.cluster.clone(),
            self.cluster.clone(),
            Arc::new(NoHooks),
            "pg_dump",
            "psql",
        );

        CommandContext {
            session,
            tenant,
            orchestrator,
            media: Arc::new(WalkingTransfer::new(
                LocalMediaStorage::new(self.media_root.path().to_path_buf()),
                vec!["__sized__".to_string()],
            )),
            object_store: Arc::new(FsObjectStore::new(self.object_root.path().to_path_buf())),
            scratch_root: self.scratch.path().to_path_buf(),
        }
    }

    /// Writes a media file for `domain`
    pub fn add_media(&self, domain: &str, relative: &str, contents: &[u8]) {
        let path = self.media_root.path().join(domain).join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn media_files(&self, domain: &str) -> Vec<String> {
        list_files(&self.media_root.path().join(domain))
    }

    pub fn out_path(&self, name: &str) -> PathBuf {
        self.out.path().join(name)
    }

    /// Nothing left behind in the scratch root
    pub fn scratch_is_clean(&self) -> bool {
        fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }
}

/// The namespace a session points at before a command runs
pub fn public_namespace() -> Namespace {
    Namespace::new("public").unwrap()
}

pub fn tenant(domain: &str) -> Tenant {
    Tenant::new(domain, None).unwrap()
}

pub fn tenant_with_schema(domain: &str, schema: &str) -> Tenant {
    Tenant::new(domain, Some(schema)).unwrap()
}

// =============================================================================
// Filesystem and archive helpers
// =============================================================================

/// Relative paths of all files below `root`, sorted
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    files.sort();
    files
}

/// Top-level member names of a plain tar archive, in archive order
pub fn top_level_members(archive: &Path) -> Vec<String> {
    let mut archive = tar::Archive::new(File::open(archive).unwrap());
    let mut members: Vec<String> = Vec::new();

    for entry in archive.entries().unwrap() {
        let entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().to_string();
        let top = path.trim_end_matches('/').split('/').next().unwrap().to_string();
        if !members.contains(&top) {
            members.push(top);
        }
    }

    members
}

/// All member paths of a plain tar archive, in archive order
pub fn member_paths(archive: &Path) -> Vec<String> {
    let mut archive = tar::Archive::new(File::open(archive).unwrap());
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string()
        })
        .collect()
}

/// Reads one member of a plain tar archive
pub fn read_member(archive: &Path, name: &str) -> Option<Vec<u8>> {
    use std::io::Read;

    let mut archive = tar::Archive::new(File::open(archive).unwrap());
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().to_string_lossy() == name {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            return Some(buf);
        }
    }
    None
}
