//! Snapshot importer
//!
//! Records are written one `put` at a time so that a store can be partially
//! imported. Stores missing from the live database are reported and skipped.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::record::{remove_value_at, value_at};
use crate::storage::Engine;
use crate::{Error, Result};
use super::{FileKind, ImportOptions, ImportReport, Snapshot, relational};

#[derive(Debug, Clone)]
pub struct Importer {
    engine: Engine,
}

impl Importer {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Replay a snapshot into the live stores.
    ///
    /// With `skip_errors` every failure is collected in the report; without
    /// it the first failed record aborts the import and its error is returned.
    pub async fn import_snapshot(&self, snapshot: Snapshot, options: ImportOptions) -> Result<ImportReport> {
        let live = self.engine.store_names().await?;
        let mut report = ImportReport::default();

        for (store, records) in snapshot.stores {
            if !live.contains(&store) {
                let message = format!("Store '{}' does not exist in the database, skipped", store);
                warn!("{}", message);
                report.errors.push(message);
                continue;
            }

            let descriptor = self.engine.descriptor(&store).await?;

            if options.clear_before_import {
                if let Err(e) = self.engine.clear(&store).await {
                    if !options.skip_errors {
                        return Err(e);
                    }
                    let message = format!("Failed to clear store '{}': {}", store, e);
                    warn!("{}", message);
                    report.errors.push(message);
                }
            }

            let mut imported = 0;
            for (position, mut record) in records.into_iter().enumerate() {
                if descriptor.auto_increment
                    && value_at(&record, &descriptor.key_path).is_none_or(Value::is_null)
                {
                    remove_value_at(&mut record, &descriptor.key_path);
                }

                match self.engine.put_one(&store, record).await {
                    Ok(_) => imported += 1,
                    Err(e) if options.skip_errors => {
                        let message = format!("Failed to import record {} into '{}': {}", position, store, e);
                        warn!("{}", message);
                        report.errors.push(message);
                    }
                    Err(e) => return Err(e),
                }
            }
            report.imported.insert(store, imported);
        }

        report.success = report.errors.is_empty();
        info!(
            "Imported {} record(s) into {} store(s), {} error(s)",
            report.total_imported(),
            report.imported.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Import a JSON snapshot file
    pub async fn import_from_structured_file(&self, path: &Path, options: ImportOptions) -> Result<ImportReport> {
        let text = std::fs::read_to_string(path)?;
        let snapshot = Snapshot::from_json(&text)?;
        self.import_snapshot(snapshot, options).await
    }

    /// Import a SQLite snapshot file, one table per store
    pub async fn import_from_relational_file(&self, path: &Path, options: ImportOptions) -> Result<ImportReport> {
        let manager = self.engine.manager();
        let mut snapshot = Snapshot::new(manager.database_name(), manager.version());
        snapshot.stores = relational::decode_from_path(path)?;
        self.import_snapshot(snapshot, options).await
    }

    /// Import either kind of file, chosen by suffix
    pub async fn import_file(&self, path: &Path, options: ImportOptions) -> Result<ImportReport> {
        info!("Importing {}", path.display());
        match FileKind::from_path(path) {
            FileKind::Relational => self.import_from_relational_file(path, options).await,
            FileKind::Structured => self.import_from_structured_file(path, options).await,
        }
    }
}

impl From<Error> for ImportReport {
    /// A report carrying a single fatal error
    fn from(err: Error) -> Self {
        Self {
            success: false,
            imported: Default::default(),
            errors: vec![err.to_string()],
        }
    }
}
