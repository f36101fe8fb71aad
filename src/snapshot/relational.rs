//! Relational file codec - snapshot stores as SQLite tables
//!
//! Each non-empty store becomes one table. Its columns are inferred from the
//! store's first record only; fields that appear only in later records are
//! not exported. Booleans are stored as 0/1 and nested values as JSON text.
//! On the way back, text that parses as a JSON object or array is restored
//! to structured form, which also applies to plain strings that merely look
//! like JSON.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde_json::Value;
use tracing::{debug, warn};

use crate::record::{Record, json_to_sql};
use crate::{Error, Result};

/// Column type inferred from a sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    /// Stored as INTEGER 0/1; the declared type lets the importer restore booleans
    Boolean,
    Text,
}

impl ColumnType {
    pub fn infer(sample: &Value) -> Self {
        match sample {
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
            Value::Number(_) => ColumnType::Real,
            Value::Bool(_) => ColumnType::Boolean,
            _ => ColumnType::Text,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
        }
    }

    fn from_declared(declared: &str) -> Self {
        match declared.to_uppercase().as_str() {
            "INTEGER" => ColumnType::Integer,
            "REAL" => ColumnType::Real,
            "BOOLEAN" => ColumnType::Boolean,
            _ => ColumnType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Infer a table from the first record of a store
    pub fn infer(name: &str, sample: &Record, key_path: Option<&str>) -> Self {
        let columns = sample
            .iter()
            .map(|(field, value)| Column {
                name: field.clone(),
                ty: ColumnType::infer(value),
                primary_key: key_path == Some(field.as_str()),
            })
            .collect();
        Self {
            name: name.to_string(),
            columns,
        }
    }

    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", bracket(&c.name), c.ty.as_sql());
                if c.primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                def
            })
            .collect();
        format!("CREATE TABLE {} ({})", bracket(&self.name), columns.join(", "))
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| bracket(&c.name)).collect();
        let placeholders = vec!["?"; self.columns.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            bracket(&self.name),
            names.join(", "),
            placeholders.join(", ")
        )
    }
}

/// Bracket-quote an identifier, falling back to double quotes for names
/// containing `]`
pub fn bracket(name: &str) -> String {
    if name.contains(']') {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        format!("[{}]", name)
    }
}

/// Write `stores` as tables into a new SQLite file at `path`.
/// Returns the names of the tables written.
pub fn encode_to_path(
    path: &Path,
    stores: &BTreeMap<String, Vec<Record>>,
    key_paths: &BTreeMap<String, String>,
) -> Result<Vec<String>> {
    // A zero-length file is a valid empty database; truncates leftovers too
    let staging = staging_path(path);
    std::fs::File::create(&staging)?;

    let written = Connection::open(&staging)
        .map_err(Error::from)
        .and_then(|mut conn| write_tables(&mut conn, stores, key_paths));

    match written {
        Ok(tables) => {
            std::fs::rename(&staging, path)?;
            Ok(tables)
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&staging) {
                warn!("Could not remove {}: {}", staging.display(), cleanup);
            }
            Err(e)
        }
    }
}

fn write_tables(
    conn: &mut Connection,
    stores: &BTreeMap<String, Vec<Record>>,
    key_paths: &BTreeMap<String, String>,
) -> Result<Vec<String>> {
    let tx = conn.transaction()?;
    let mut tables = Vec::new();

    for (store, records) in stores {
        let Some(first) = records.first() else {
            debug!("Skipping empty store {}", store);
            continue;
        };
        if is_reserved(store) {
            return Err(Error::Format(format!(
                "store '{}' cannot be exported: the 'sqlite_' table prefix is reserved",
                store
            )));
        }
        let table = TableSchema::infer(store, first, key_paths.get(store).map(String::as_str));
        tx.execute(&table.create_sql(), [])?;

        {
            let mut insert = tx.prepare(&table.insert_sql())?;
            for record in records {
                let values = table
                    .columns
                    .iter()
                    .map(|c| record.get(&c.name).map(json_to_sql).unwrap_or(rusqlite::types::Value::Null));
                insert.execute(params_from_iter(values))?;
            }
        }

        debug!("Wrote table {} with {} row(s)", store, records.len());
        tables.push(store.clone());
    }

    tx.commit()?;
    Ok(tables)
}

/// Read every user table of the SQLite file at `path` back into records
pub fn decode_from_path(path: &Path) -> Result<BTreeMap<String, Vec<Record>>> {
    std::fs::metadata(path)?;
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| format_error(path, e))?;
    let stores = read_tables(&conn).map_err(|e| match e {
        Error::Storage(e) => format_error(path, e),
        other => other,
    })?;

    if stores.is_empty() {
        return Err(Error::Format(format!("no tables found in {}", path.display())));
    }
    Ok(stores)
}

fn read_tables(conn: &Connection) -> Result<BTreeMap<String, Vec<Record>>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND lower(substr(name, 1, 7)) <> 'sqlite_' ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stores = BTreeMap::new();
    for table in tables {
        let records = read_table(conn, &table)?;
        debug!("Read table {} with {} row(s)", table, records.len());
        stores.insert(table, records);
    }
    Ok(stores)
}

fn read_table(conn: &Connection, table: &str) -> Result<Vec<Record>> {
    let mut info = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
    let columns = info
        .query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, ColumnType::from_declared(&row.get::<_, String>(1)?)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let names: Vec<String> = columns.iter().map(|(name, _)| bracket(name)).collect();
    let sql = format!("SELECT {} FROM {}", names.join(", "), bracket(table));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (i, (name, ty)) in columns.iter().enumerate() {
            record.insert(name.clone(), restore_value(row.get_ref(i)?, *ty));
        }
        records.push(record);
    }
    Ok(records)
}

/// Reverse the export coercions for one cell
fn restore_value(value: ValueRef<'_>, ty: ColumnType) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if ty == ColumnType::Boolean && (i == 0 || i == 1) => Value::Bool(i == 1),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match serde_json::from_str::<Value>(&text) {
                Ok(parsed) if parsed.is_object() || parsed.is_array() => parsed,
                _ => Value::String(text.into_owned()),
            }
        }
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// SQLite refuses user tables named `sqlite_*`, in any letter case
fn is_reserved(name: &str) -> bool {
    name.get(..7).is_some_and(|prefix| prefix.eq_ignore_ascii_case("sqlite_"))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

fn format_error(path: &Path, err: rusqlite::Error) -> Error {
    Error::Format(format!("{} is not a readable relational file: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn stores(entries: Vec<(&str, Vec<Value>)>) -> BTreeMap<String, Vec<Record>> {
        entries
            .into_iter()
            .map(|(name, records)| (name.to_string(), records.into_iter().map(record).collect()))
            .collect()
    }

    #[test]
    fn test_column_type_inference() {
        assert_eq!(ColumnType::infer(&json!(3)), ColumnType::Integer);
        assert_eq!(ColumnType::infer(&json!(3.5)), ColumnType::Real);
        assert_eq!(ColumnType::infer(&json!(false)), ColumnType::Boolean);
        assert_eq!(ColumnType::infer(&json!("x")), ColumnType::Text);
        assert_eq!(ColumnType::infer(&json!({"a": 1})), ColumnType::Text);
        assert_eq!(ColumnType::infer(&json!(null)), ColumnType::Text);
    }

    #[test]
    fn test_create_sql_quotes_and_flags_primary_key() {
        let table = TableSchema::infer("records", &record(json!({"uid": 1, "index": 0, "title": "t"})), Some("uid"));
        assert_eq!(
            table.create_sql(),
            "CREATE TABLE [records] ([index] INTEGER, [title] TEXT, [uid] INTEGER PRIMARY KEY)"
        );
        assert_eq!(
            table.insert_sql(),
            "INSERT INTO [records] ([index], [title], [uid]) VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn test_round_trip_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let input = stores(vec![(
            "records",
            vec![
                json!({"uid": 1, "title": "a", "score": 1.5, "done": true}),
                json!({"uid": 2, "title": "b", "score": 2.25, "done": false}),
            ],
        )]);
        let key_paths = BTreeMap::from([("records".to_string(), "uid".to_string())]);

        let tables = encode_to_path(&path, &input, &key_paths).unwrap();
        assert_eq!(tables, vec!["records"]);
        assert!(!staging_path(&path).exists());

        let output = decode_from_path(&path).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_nested_values_restored_and_extra_fields_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let input = stores(vec![(
            "notes",
            vec![
                json!({"id": "a", "meta": {"tags": ["x"]}, "list": [1, 2]}),
                json!({"id": "b", "meta": {"tags": []}, "list": [], "extra": "dropped"}),
            ],
        )]);

        encode_to_path(&path, &input, &BTreeMap::new()).unwrap();
        let output = decode_from_path(&path).unwrap();
        let notes = &output["notes"];
        assert_eq!(notes[0]["meta"], json!({"tags": ["x"]}));
        assert_eq!(notes[1]["list"], json!([]));
        assert!(notes[1].get("extra").is_none());
    }

    #[test]
    fn test_json_looking_text_is_restored_as_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let input = stores(vec![("notes", vec![json!({"id": 1, "body": "{\"looks\": \"structured\"}"})])]);

        encode_to_path(&path, &input, &BTreeMap::new()).unwrap();
        let output = decode_from_path(&path).unwrap();
        assert_eq!(output["notes"][0]["body"], json!({"looks": "structured"}));
    }

    #[test]
    fn test_empty_store_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let input = stores(vec![("empty", vec![]), ("full", vec![json!({"id": 1})])]);

        let tables = encode_to_path(&path, &input, &BTreeMap::new()).unwrap();
        assert_eq!(tables, vec!["full"]);

        let output = decode_from_path(&path).unwrap();
        assert!(!output.contains_key("empty"));
        assert_eq!(output["full"].len(), 1);
    }

    #[test]
    fn test_sqlite_like_names_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let input = stores(vec![
            ("sqlitex", vec![json!({"id": 1, "v": "a"})]),
            ("sqlite3notes", vec![json!({"id": 2, "v": "b"})]),
        ]);

        let tables = encode_to_path(&path, &input, &BTreeMap::new()).unwrap();
        assert_eq!(tables, vec!["sqlite3notes", "sqlitex"]);
        assert_eq!(decode_from_path(&path).unwrap(), input);
    }

    #[test]
    fn test_reserved_store_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let input = stores(vec![("SQLITE_notes", vec![json!({"id": 1})])]);

        let err = encode_to_path(&path, &input, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::Format(ref m) if m.contains("SQLITE_notes")), "{}", err);
        assert!(!path.exists());
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_decode_rejects_non_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, b"this is certainly not a sqlite file, just some bytes").unwrap();
        assert!(matches!(decode_from_path(&path), Err(Error::Format(_))));
    }

    #[test]
    fn test_decode_rejects_file_without_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        encode_to_path(&path, &BTreeMap::new(), &BTreeMap::new()).unwrap();
        assert!(matches!(decode_from_path(&path), Err(Error::Format(_))));
    }

    #[test]
    fn test_decode_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(decode_from_path(&dir.path().join("nope.db")), Err(Error::Io(_))));
    }
}
