//! Diary - the data-access contract used by front ends
//!
//! All diary records live in one auto-increment store, `records`, keyed by
//! `uid` and indexed on `date`, `index` and `title`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::config::DaybookConfig;
use crate::record::{Key, Record};
use crate::schema::{SchemaRegistry, StoreDescriptor};
use crate::snapshot::{ExportedFile, Exporter, ImportOptions, ImportReport, Importer};
use crate::storage::{ConnectionManager, DatabaseLocation, DeleteOutcome, Engine};
use crate::{Error, Result};

pub const RECORDS_STORE: &str = "records";
pub const KEY_FIELD: &str = "uid";

/// Schema of the diary database
pub fn diary_schema() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.declare(
        StoreDescriptor::new(RECORDS_STORE)
            .key_path(KEY_FIELD)
            .auto_increment(true)
            .index("date")
            .index("index")
            .index("title"),
    );
    registry
}

/// Typed view of a diary record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub uid: Option<i64>,
    pub date: String,
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl Entry {
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record.clone()))?)
    }
}

pub struct Diary {
    engine: Engine,
    export_dir: PathBuf,
}

impl Diary {
    /// Open the diary described by `config`, creating it on first use
    pub async fn open(config: &DaybookConfig) -> Result<Self> {
        let manager = ConnectionManager::new(
            config.database_name.clone(),
            config.version,
            DatabaseLocation::File(config.database_path()),
            diary_schema(),
        )?;
        manager.open().await?;
        Ok(Self::with_manager(manager, config.export_dir.clone()))
    }

    /// An ephemeral diary that vanishes when dropped
    pub fn in_memory(export_dir: impl Into<PathBuf>) -> Result<Self> {
        let manager = ConnectionManager::in_memory("daybook", 1, diary_schema())?;
        Ok(Self::with_manager(manager, export_dir.into()))
    }

    fn with_manager(manager: ConnectionManager, export_dir: PathBuf) -> Self {
        Self {
            engine: Engine::new(Arc::new(manager)),
            export_dir,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Create an empty record for `date` at position `index`
    pub async fn add_record(&self, date: &str, index: i64) -> Result<Key> {
        let record = json!({
            "date": date,
            "index": index,
            "title": "",
            "content": "",
        });
        let Value::Object(record) = record else {
            return Err(Error::Format("record template is not an object".into()));
        };
        let key = self.engine.add_one(RECORDS_STORE, record).await?;
        info!("Added record {} for {}", key, date);
        Ok(key)
    }

    /// Records for one date, ordered by their `index` field
    pub async fn list_records_by_date(&self, date: &str) -> Result<Vec<Record>> {
        let mut records = self
            .engine
            .get_by_index(RECORDS_STORE, "date", &Value::String(date.to_string()))
            .await?;
        records.sort_by(|a, b| {
            let position = |r: &Record| r.get("index").and_then(Value::as_f64).unwrap_or(0.0);
            position(a).total_cmp(&position(b))
        });
        Ok(records)
    }

    pub async fn get_record(&self, key: &Key) -> Result<Option<Record>> {
        self.engine.get(RECORDS_STORE, key).await
    }

    pub async fn update_record(&self, record: Record) -> Result<Key> {
        self.engine.put_one(RECORDS_STORE, record).await
    }

    pub async fn delete_record(&self, key: &Key) -> Result<()> {
        self.engine.delete(RECORDS_STORE, key).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.engine.count(RECORDS_STORE).await
    }

    /// Export everything as a SQLite file into the export directory
    pub async fn export_all(&self) -> Result<ExportedFile> {
        Exporter::new(self.engine.clone())
            .export_to_relational_file(&self.export_dir, None)
            .await
    }

    pub async fn export_json(&self) -> Result<ExportedFile> {
        Exporter::new(self.engine.clone())
            .export_to_structured_file(&self.export_dir, None)
            .await
    }

    pub async fn import_all(&self, path: &Path, clear_before_import: bool) -> Result<ImportReport> {
        let options = ImportOptions {
            clear_before_import,
            ..ImportOptions::default()
        };
        self.import_with(path, options).await
    }

    /// Import a snapshot file of either kind
    pub async fn import_with(&self, path: &Path, options: ImportOptions) -> Result<ImportReport> {
        Importer::new(self.engine.clone()).import_file(path, options).await
    }

    /// Destroy the whole diary database
    pub async fn destroy(&self) -> Result<DeleteOutcome> {
        self.engine.manager().delete().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_list_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let diary = Diary::in_memory(dir.path()).unwrap();

        let second = diary.add_record("2024-01-01", 1).await.unwrap();
        let other_day = diary.add_record("2024-01-02", 0).await.unwrap();
        let first = diary.add_record("2024-01-01", 0).await.unwrap();
        assert_ne!(second, first);
        assert_ne!(other_day, first);

        let listed = diary.list_records_by_date("2024-01-01").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|r| Key::from_json(&r["uid"]).unwrap()).collect();
        assert_eq!(keys, vec![first, second]);

        let entry = Entry::from_record(&listed[0]).unwrap();
        assert_eq!(entry.date, "2024-01-01");
        assert_eq!(entry.title, "");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let diary = Diary::in_memory(dir.path()).unwrap();
        let key = diary.add_record("2024-05-05", 0).await.unwrap();

        let mut record = diary.get_record(&key).await.unwrap().unwrap();
        record.insert("title".into(), json!("Walk"));
        record.insert("content".into(), json!("# Went to the *park*"));
        assert_eq!(diary.update_record(record).await.unwrap(), key);

        let titled = diary.engine().get_by_index(RECORDS_STORE, "title", &json!("Walk")).await.unwrap();
        assert_eq!(titled.len(), 1);
        assert_eq!(diary.count().await.unwrap(), 1);

        diary.delete_record(&key).await.unwrap();
        assert!(diary.get_record(&key).await.unwrap().is_none());
        diary.delete_record(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_export_then_import_all() {
        let dir = tempfile::tempdir().unwrap();
        let source = Diary::in_memory(dir.path()).unwrap();
        source.add_record("2024-01-01", 0).await.unwrap();
        source.add_record("2024-01-01", 1).await.unwrap();

        let exported = source.export_all().await.unwrap();
        assert_eq!(exported.path.parent().unwrap(), dir.path());

        let target = Diary::in_memory(dir.path()).unwrap();
        target.add_record("1999-01-01", 0).await.unwrap();
        let report = target.import_all(&exported.path, true).await.unwrap();
        assert!(report.success);
        assert_eq!(report.imported[RECORDS_STORE], 2);
        assert_eq!(target.count().await.unwrap(), 2);
        assert!(target.list_records_by_date("1999-01-01").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaybookConfig {
            database_name: "journal".into(),
            version: 1,
            data_dir: dir.path().join("data"),
            export_dir: dir.path().join("exports"),
        };

        {
            let diary = Diary::open(&config).await.unwrap();
            diary.add_record("2024-02-02", 0).await.unwrap();
            let exported = diary.export_json().await.unwrap();
            assert!(exported.path.starts_with(dir.path().join("exports")));
        }

        let diary = Diary::open(&config).await.unwrap();
        assert_eq!(diary.count().await.unwrap(), 1);
        assert_eq!(diary.destroy().await.unwrap(), DeleteOutcome::Deleted);
        assert!(!config.database_path().exists());
    }
}
