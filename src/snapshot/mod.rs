//! Snapshots - format-neutral copies of a whole database
//!
//! Both export targets (pretty JSON, SQLite file) are produced from a
//! [`Snapshot`], and both import sources are normalised into one before
//! being replayed into the live stores.

pub mod export;
pub mod import;
pub mod relational;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::record::Record;
use crate::{Error, Result};

pub use export::{ExportedFile, Exporter};
pub use import::Importer;

/// Every record of every store, keyed by store name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub version: u32,
    /// Informational only; unparseable values read as `None`
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub export_date: Option<DateTime<Utc>>,
    pub stores: BTreeMap<String, Vec<Record>>,
}

impl Snapshot {
    pub fn new(database_name: impl Into<String>, version: u32) -> Self {
        Self {
            database_name: database_name.into(),
            version,
            export_date: Some(Utc::now()),
            stores: BTreeMap::new(),
        }
    }

    /// Parse the structured-text form
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Format(format!("invalid snapshot: {}", e)))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn record_count(&self) -> usize {
        self.stores.values().map(Vec::len).sum()
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|at| at.with_timezone(&Utc)))
}

/// How snapshot records are replayed into the live stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Empty each target store before inserting
    pub clear_before_import: bool,
    /// Collect per-record failures instead of aborting on the first one
    pub skip_errors: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            clear_before_import: false,
            skip_errors: true,
        }
    }
}

/// Outcome of an import. `success` is false whenever `errors` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub imported: BTreeMap<String, usize>,
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn total_imported(&self) -> usize {
        self.imported.values().sum()
    }
}

impl std::fmt::Display for ImportReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Import {}:", if self.success { "succeeded" } else { "finished with errors" })?;
        for (store, count) in &self.imported {
            writeln!(f, "  {}: {} record(s)", store, count)?;
        }
        for error in &self.errors {
            writeln!(f, "  ! {}", error)?;
        }
        Ok(())
    }
}

/// Import source kind, chosen by file suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Relational,
    Structured,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "db" | "sqlite" | "sqlite3" => FileKind::Relational,
            _ => FileKind::Structured,
        }
    }
}

/// `{databaseName}_{ISO-8601 timestamp without ':' and '.'}.{extension}`
pub fn default_filename(database_name: &str, at: DateTime<Utc>, extension: &str) -> String {
    let stamp: String = at
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .chars()
        .filter(|c| *c != ':' && *c != '.')
        .collect();
    format!("{}_{}.{}", database_name, stamp, extension)
}
