//! Snapshot exporter

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::Result;
use crate::storage::Engine;
use super::{Snapshot, default_filename, relational};

/// A snapshot file handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// Tables (relational) or stores (structured) contained in the file
    pub tables: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Exporter {
    engine: Engine,
}

impl Exporter {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Read every store present in the database, including stores the
    /// current schema no longer declares.
    pub async fn build_snapshot(&self) -> Result<Snapshot> {
        let manager = self.engine.manager();
        manager.open().await?;

        let mut snapshot = Snapshot::new(manager.database_name(), manager.version());
        for store in self.engine.store_names().await? {
            let records = self.engine.get_all(&store).await?;
            snapshot.stores.insert(store, records);
        }
        Ok(snapshot)
    }

    /// Write the snapshot as a SQLite file into `dir`. Empty stores produce no table.
    pub async fn export_to_relational_file(&self, dir: &Path, filename: Option<&str>) -> Result<ExportedFile> {
        let snapshot = self.build_snapshot().await?;

        let mut key_paths = BTreeMap::new();
        for store in snapshot.stores.keys() {
            let descriptor = self.engine.descriptor(store).await?;
            key_paths.insert(store.clone(), descriptor.key_path);
        }

        let path = target_path(dir, filename, &snapshot, "db")?;
        let tables = relational::encode_to_path(&path, &snapshot.stores, &key_paths)?;
        let bytes = std::fs::metadata(&path)?.len();

        info!("Exported {} table(s) to {} ({} bytes)", tables.len(), path.display(), bytes);
        Ok(ExportedFile { path, bytes, tables })
    }

    /// Write the snapshot as pretty JSON into `dir`
    pub async fn export_to_structured_file(&self, dir: &Path, filename: Option<&str>) -> Result<ExportedFile> {
        let snapshot = self.build_snapshot().await?;
        let path = target_path(dir, filename, &snapshot, "json")?;
        std::fs::write(&path, snapshot.to_json_pretty()?)?;
        let bytes = std::fs::metadata(&path)?.len();

        info!("Exported {} record(s) to {}", snapshot.record_count(), path.display());
        Ok(ExportedFile {
            path,
            bytes,
            tables: snapshot.stores.keys().cloned().collect(),
        })
    }
}

fn target_path(dir: &Path, filename: Option<&str>, snapshot: &Snapshot, extension: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = match filename {
        Some(name) => name.to_string(),
        None => default_filename(&snapshot.database_name, snapshot.export_date.unwrap_or_else(Utc::now), extension),
    };
    Ok(dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaRegistry, StoreDescriptor};
    use crate::storage::ConnectionManager;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> Engine {
        let mut registry = SchemaRegistry::new();
        registry
            .declare(StoreDescriptor::new("records").key_path("uid").auto_increment(true).index("date"))
            .declare(StoreDescriptor::new("empty"));
        Engine::new(Arc::new(ConnectionManager::in_memory("daybook", 3, registry).unwrap()))
    }

    #[tokio::test]
    async fn test_build_snapshot_covers_all_stores() {
        let engine = engine();
        engine
            .add_one("records", json!({"date": "2024-01-01"}).as_object().unwrap().clone())
            .await
            .unwrap();

        let snapshot = Exporter::new(engine).build_snapshot().await.unwrap();
        assert_eq!(snapshot.database_name, "daybook");
        assert_eq!(snapshot.version, 3);
        assert!(snapshot.export_date.is_some());
        assert_eq!(snapshot.stores.keys().collect::<Vec<_>>(), vec!["empty", "records"]);
        assert_eq!(snapshot.stores["records"][0]["uid"], json!(1));
    }

    #[tokio::test]
    async fn test_relational_export_default_name_and_empty_store() {
        let engine = engine();
        engine
            .add_one("records", json!({"date": "2024-01-01"}).as_object().unwrap().clone())
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();

        let exported = Exporter::new(engine)
            .export_to_relational_file(dir.path(), None)
            .await
            .unwrap();

        let name = exported.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("daybook_"), "{}", name);
        assert!(name.ends_with("Z.db"), "{}", name);
        assert!(!name.trim_end_matches(".db").contains('.'));
        assert!(!name.contains(':'));
        assert_eq!(exported.tables, vec!["records"]);
        assert!(exported.bytes > 0);
    }

    #[tokio::test]
    async fn test_structured_export_named() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();

        let exported = Exporter::new(engine)
            .export_to_structured_file(dir.path(), Some("backup.json"))
            .await
            .unwrap();
        assert_eq!(exported.path, dir.path().join("backup.json"));

        let text = std::fs::read_to_string(&exported.path).unwrap();
        let snapshot = Snapshot::from_json(&text).unwrap();
        assert_eq!(snapshot.stores.len(), 2);
        assert_eq!(snapshot.record_count(), 0);
    }
}
