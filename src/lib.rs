//! # Daybook - dated personal notes on a local object store
//!
//! Daybook keeps diary records in an embedded, transactional object store
//! and can move the whole dataset in and out of portable snapshots.
//!
//! Daybook provides:
//! - A schema registry describing named record stores (key path, key generator, indexes)
//! - A connection manager that creates and upgrades the store database
//! - Transactional CRUD, index lookups and cursors over JSON records
//! - Snapshot export to JSON or to a self-describing SQLite file
//! - Snapshot import from either format, with merge and error-tolerance policies

pub mod schema;
pub mod record;
pub mod storage;
pub mod snapshot;
pub mod diary;
pub mod config;
pub mod output;
pub mod ui;


// Re-exports for convenient access
pub use schema::{IndexDescriptor, SchemaRegistry, StoreDescriptor};
pub use record::{Key, Record};
pub use storage::{ConnectionManager, CursorDirection, CursorOptions, DatabaseLocation, DeleteOutcome, Engine, KeyRange, Visit};
pub use snapshot::{ExportedFile, Exporter, ImportOptions, ImportReport, Importer, Snapshot};
pub use diary::{Diary, Entry};

/// Result type alias for Daybook operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Daybook operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Constraint error: {0}")]
    Constraint(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Store not found: {0}")]
    UnknownStore(String),

    #[error("Index not found: {0}")]
    UnknownIndex(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
