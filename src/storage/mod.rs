//! Storage Layer - SQLite-backed object store
//!
//! The database file holds:
//! - daybook_stores(name, table_name, key_path, auto_increment, current_key)
//! - daybook_indexes(store, name, field_path, is_unique, position)
//! - one "store:<name>"(pk, doc) table per store, with expression indexes on doc
//!
//! The schema version is kept in `PRAGMA user_version`.

pub mod catalog;
pub mod connection;
pub mod cursor;
pub mod engine;
pub mod schema;
pub mod transaction;

pub use connection::{ConnectionManager, DatabaseLocation, DeleteOutcome};
pub use cursor::{CursorDirection, CursorOptions, KeyRange, Visit};
pub use engine::Engine;
pub use transaction::{StoreTx, TxMode};
