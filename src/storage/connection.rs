//! Connection manager - owns the single live database handle
//!
//! The handle is opened lazily, memoized, and lent to one closure at a time.
//! Opening a database whose stored version is older than the requested one
//! runs the upgrade: every declared store is dropped (if present) and
//! recreated from its descriptor. Data in recreated stores is lost.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex as StdMutex, OnceLock};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OpenFlags};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::schema::SchemaRegistry;
use crate::{Error, Result};
use super::{catalog, schema};

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Private in-memory database; contents vanish when the connection closes
    Memory,
    File(PathBuf),
}

/// Result of a database deletion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Another connection holds the database; nothing was removed
    Blocked(String),
}

static CLAIMED: OnceLock<StdMutex<HashSet<PathBuf>>> = OnceLock::new();

fn claimed() -> &'static StdMutex<HashSet<PathBuf>> {
    CLAIMED.get_or_init(|| StdMutex::new(HashSet::new()))
}

/// Marks a database file as managed by exactly one `ConnectionManager`.
#[derive(Debug)]
struct Claim(Option<PathBuf>);

impl Claim {
    fn acquire(location: &DatabaseLocation) -> Result<Self> {
        let DatabaseLocation::File(path) = location else {
            return Ok(Claim(None));
        };
        let path = std::path::absolute(path).map_err(|e| Error::Connection(e.to_string()))?;
        let mut set = claimed().lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(path.clone()) {
            return Err(Error::Connection(format!(
                "{} is already managed by another connection manager",
                path.display()
            )));
        }
        Ok(Claim(Some(path)))
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            claimed().lock().unwrap_or_else(|e| e.into_inner()).remove(&path);
        }
    }
}

/// Opens, upgrades, memoizes, closes and deletes one database.
pub struct ConnectionManager {
    database_name: String,
    version: u32,
    location: DatabaseLocation,
    registry: SchemaRegistry,
    conn: Mutex<Option<Connection>>,
    _claim: Claim,
}

impl ConnectionManager {
    /// Create a manager. Nothing is opened until the first call needs the connection.
    pub fn new(
        database_name: impl Into<String>,
        version: u32,
        location: DatabaseLocation,
        registry: SchemaRegistry,
    ) -> Result<Self> {
        if version == 0 {
            return Err(Error::Connection("database version must be a positive integer".into()));
        }
        let claim = Claim::acquire(&location)?;
        Ok(Self {
            database_name: database_name.into(),
            version,
            location,
            registry,
            conn: Mutex::new(None),
            _claim: claim,
        })
    }

    pub fn in_memory(database_name: impl Into<String>, version: u32, registry: SchemaRegistry) -> Result<Self> {
        Self::new(database_name, version, DatabaseLocation::Memory, registry)
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Open the database if it is not open yet. Idempotent.
    pub async fn open(&self) -> Result<()> {
        self.with_connection(|_| Ok(())).await
    }

    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Lend the connection to `f`, opening it first if needed.
    pub(crate) async fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.open_connection()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(Error::Connection(format!("{} is not open", self.database_name)));
        };
        f(conn)
    }

    /// Release the handle. The next call reopens from scratch.
    pub async fn close(&self) {
        if self.conn.lock().await.take().is_some() {
            debug!("Closed database {}", self.database_name);
        }
    }

    /// Close, then destroy the whole database.
    pub async fn delete(&self) -> Result<DeleteOutcome> {
        let mut guard = self.conn.lock().await;
        guard.take();

        let DatabaseLocation::File(path) = &self.location else {
            info!("Deleted in-memory database {}", self.database_name);
            return Ok(DeleteOutcome::Deleted);
        };

        if path.exists() {
            if let Some(reason) = probe_blocked(path)? {
                warn!("Deletion of {} blocked: {}", self.database_name, reason);
                return Ok(DeleteOutcome::Blocked(reason));
            }
            for file in database_files(path) {
                if file.exists() {
                    std::fs::remove_file(&file)?;
                }
            }
        }

        info!("Deleted database {} at {}", self.database_name, path.display());
        Ok(DeleteOutcome::Deleted)
    }

    fn open_connection(&self) -> Result<Connection> {
        let mut conn = match &self.location {
            DatabaseLocation::Memory => Connection::open_in_memory(),
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| Error::Connection(e.to_string()))?;
                    }
                }
                Connection::open(path)
            }
        }
        .map_err(|e| Error::Connection(e.to_string()))?;

        let stored = initialize(&conn).map_err(connection_error)?;
        if self.version < stored {
            return Err(Error::Connection(format!(
                "requested version {} of {} is lower than the stored version {}",
                self.version, self.database_name, stored
            )));
        }
        if self.version > stored {
            info!("Upgrading database {} from version {} to {}", self.database_name, stored, self.version);
            upgrade(&mut conn, &self.registry, self.version).map_err(connection_error)?;
        }

        info!("Opened database {} (version {})", self.database_name, self.version);
        Ok(conn)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("database_name", &self.database_name)
            .field("version", &self.version)
            .field("location", &self.location)
            .finish()
    }
}

fn connection_error(err: Error) -> Error {
    match err {
        Error::Connection(_) => err,
        other => Error::Connection(other.to_string()),
    }
}

/// Create the catalog if missing and return the stored version
fn initialize(conn: &Connection) -> Result<u32> {
    for stmt in schema::catalog_statements() {
        conn.execute(stmt, [])?;
    }
    let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Recreate every declared store and record the new version, atomically
fn upgrade(conn: &mut Connection, registry: &SchemaRegistry, version: u32) -> Result<()> {
    let tx = conn.transaction()?;
    for store in registry.iter() {
        if catalog::store_exists(&tx, &store.name)? {
            debug!("Dropping store {} for recreation", store.name);
            catalog::drop_store(&tx, &store.name)?;
        }
        catalog::create_store(&tx, store)?;
        debug!("Created store {} (key path {}, {} indexes)", store.name, store.key_path, store.indexes.len());
    }
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()?;
    Ok(())
}

/// Returns a reason when another connection holds a lock on the database
fn probe_blocked(path: &Path) -> Result<Option<String>> {
    let probe = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
        .map_err(|e| Error::Connection(e.to_string()))?;
    probe.busy_timeout(Duration::ZERO)?;

    match probe.execute_batch("BEGIN EXCLUSIVE; ROLLBACK;") {
        Ok(()) => Ok(None),
        Err(rusqlite::Error::SqliteFailure(e, msg))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            Ok(Some(msg.unwrap_or_else(|| e.to_string())))
        }
        Err(e) => Err(Error::Connection(e.to_string())),
    }
}

fn database_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}
