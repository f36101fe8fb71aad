//! Engine transactions scoped to a set of stores
//!
//! A `StoreTx` wraps one SQLite transaction. Every request issued through it
//! commits together or not at all: dropping the `StoreTx` without calling
//! [`StoreTx::commit`] rolls everything back.

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params, params_from_iter};
use serde_json::Value;

use crate::record::{Key, Record, json_to_sql, set_value_at, value_at};
use crate::schema::StoreDescriptor;
use crate::{Error, Result};
use super::cursor::{CursorOptions, Visit};
use super::{catalog, schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

pub struct StoreTx<'c> {
    tx: Transaction<'c>,
    mode: TxMode,
    stores: Vec<StoreDescriptor>,
}

impl<'c> StoreTx<'c> {
    /// Begin a transaction over `names`. Fails with `UnknownStore` if any is missing.
    pub fn begin(conn: &'c mut Connection, mode: TxMode, names: &[&str]) -> Result<Self> {
        let behavior = match mode {
            TxMode::ReadOnly => TransactionBehavior::Deferred,
            TxMode::ReadWrite => TransactionBehavior::Immediate,
        };
        let tx = conn.transaction_with_behavior(behavior)?;

        let mut stores = Vec::with_capacity(names.len());
        for name in names {
            let descriptor = catalog::load_descriptor(&tx, name)?
                .ok_or_else(|| Error::UnknownStore(name.to_string()))?;
            stores.push(descriptor);
        }
        Ok(Self { tx, mode, stores })
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn descriptor(&self, store: &str) -> Result<&StoreDescriptor> {
        self.stores
            .iter()
            .find(|s| s.name == store)
            .ok_or_else(|| Error::Transaction(format!("store '{}' is not in the transaction scope", store)))
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    // ========== Writes ==========

    /// Insert a new record; an existing primary key is a constraint violation
    pub fn add(&self, store: &str, record: Record) -> Result<Key> {
        self.write(store, record, false)
    }

    /// Insert or replace a record by primary key
    pub fn put(&self, store: &str, record: Record) -> Result<Key> {
        self.write(store, record, true)
    }

    /// Remove a record. Missing keys are ignored.
    pub fn delete(&self, store: &str, key: &Key) -> Result<()> {
        self.ensure_writable()?;
        let table = self.table(store)?;
        self.tx.execute(&format!("DELETE FROM {} WHERE pk = ?1", table), [key])?;
        Ok(())
    }

    pub fn clear(&self, store: &str) -> Result<()> {
        self.ensure_writable()?;
        let table = self.table(store)?;
        self.tx.execute(&format!("DELETE FROM {}", table), [])?;
        Ok(())
    }

    fn write(&self, store: &str, mut record: Record, overwrite: bool) -> Result<Key> {
        self.ensure_writable()?;
        let descriptor = self.descriptor(store)?;
        let key = self.resolve_key(descriptor, &mut record)?;
        let doc = serde_json::to_string(&record)?;
        let table = schema::quote_ident(&schema::table_name(store));

        let sql = if overwrite {
            format!(
                "INSERT INTO {} (pk, doc) VALUES (?1, ?2) ON CONFLICT(pk) DO UPDATE SET doc = excluded.doc",
                table
            )
        } else {
            format!("INSERT INTO {} (pk, doc) VALUES (?1, ?2)", table)
        };
        self.tx.execute(&sql, params![key, doc])?;
        Ok(key)
    }

    /// Primary key of a record, drawing from the key generator when the
    /// store auto-increments and the record carries no key.
    fn resolve_key(&self, store: &StoreDescriptor, record: &mut Record) -> Result<Key> {
        let explicit = match value_at(record, &store.key_path) {
            Some(value) if !value.is_null() => Some(Key::from_json(value)?),
            _ => None,
        };

        match explicit {
            Some(key) => {
                if store.auto_increment {
                    if let Some(n) = key.as_number() {
                        let current = catalog::current_key(&self.tx, &store.name)?;
                        if n >= current as f64 {
                            catalog::set_current_key(&self.tx, &store.name, n.floor().min(i64::MAX as f64) as i64)?;
                        }
                    }
                }
                Ok(key)
            }
            None if store.auto_increment => {
                let next = catalog::current_key(&self.tx, &store.name)?
                    .checked_add(1)
                    .ok_or_else(|| Error::Constraint(format!("key generator of '{}' is exhausted", store.name)))?;
                catalog::set_current_key(&self.tx, &store.name, next)?;
                let key = Key::Integer(next);
                set_value_at(record, &store.key_path, key.to_json())?;
                Ok(key)
            }
            None => Err(Error::InvalidKey(format!(
                "record for store '{}' has no value at key path '{}'",
                store.name, store.key_path
            ))),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            TxMode::ReadWrite => Ok(()),
            TxMode::ReadOnly => Err(Error::Transaction("write requested in a read-only transaction".into())),
        }
    }

    fn table(&self, store: &str) -> Result<String> {
        self.descriptor(store)?;
        Ok(schema::quote_ident(&schema::table_name(store)))
    }

    // ========== Reads ==========

    pub fn get(&self, store: &str, key: &Key) -> Result<Option<Record>> {
        let table = self.table(store)?;
        let doc: Option<String> = self
            .tx
            .query_row(&format!("SELECT doc FROM {} WHERE pk = ?1", table), [key], |row| row.get(0))
            .optional()?;
        doc.map(|d| parse_doc(&d)).transpose()
    }

    /// Every record in primary-key order
    pub fn get_all(&self, store: &str) -> Result<Vec<Record>> {
        let table = self.table(store)?;
        let mut stmt = self.tx.prepare(&format!("SELECT doc FROM {} ORDER BY pk", table))?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        docs.iter().map(|d| parse_doc(d)).collect()
    }

    /// Records whose indexed field equals `value`, in primary-key order
    pub fn get_by_index(&self, store: &str, index: &str, value: &Value) -> Result<Vec<Record>> {
        let descriptor = self.descriptor(store)?;
        let index = descriptor
            .find_index(index)
            .ok_or_else(|| Error::UnknownIndex(format!("{}.{}", store, index)))?;

        let sql = format!(
            "SELECT doc FROM {} WHERE {} AND {} = ?1 ORDER BY pk",
            schema::quote_ident(&schema::table_name(store)),
            schema::index_filter(&index.field_path),
            schema::index_expr(&index.field_path),
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let docs = stmt
            .query_map([json_to_sql(value)], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        docs.iter().map(|d| parse_doc(d)).collect()
    }

    pub fn count(&self, store: &str) -> Result<usize> {
        let table = self.table(store)?;
        let count: i64 = self
            .tx
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Walk the store (or one of its indexes) in cursor order, collecting
    /// every record the visitor keeps.
    pub fn scan<F>(&self, store: &str, options: &CursorOptions, mut visitor: F) -> Result<Vec<Record>>
    where
        F: FnMut(&Record) -> Visit,
    {
        let descriptor = self.descriptor(store)?;
        let (column, filter) = match &options.index {
            Some(name) => {
                let index = descriptor
                    .find_index(name)
                    .ok_or_else(|| Error::UnknownIndex(format!("{}.{}", store, name)))?;
                (schema::index_expr(&index.field_path), Some(schema::index_filter(&index.field_path)))
            }
            None => ("pk".to_string(), None),
        };

        let (mut clauses, keys) = match &options.range {
            Some(range) => range.conditions(&column),
            None => (Vec::new(), Vec::new()),
        };
        if let Some(filter) = filter {
            clauses.insert(0, filter);
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let (key_order, pk_order) = options.direction.order();
        let sql = format!(
            "SELECT {column}, doc FROM {table}{where_clause} ORDER BY {column} {key_order}, pk {pk_order}",
            table = schema::quote_ident(&schema::table_name(store)),
        );

        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(keys))?;
        let unique = options.direction.is_unique();
        let mut last: Option<SqlValue> = None;
        let mut collected = Vec::new();

        while let Some(row) = rows.next()? {
            let cursor_key: SqlValue = row.get(0)?;
            if unique && last.as_ref() == Some(&cursor_key) {
                continue;
            }
            last = Some(cursor_key);

            let doc: String = row.get(1)?;
            let record = parse_doc(&doc)?;
            if visitor(&record) == Visit::Keep {
                collected.push(record);
            }
        }
        Ok(collected)
    }
}

fn parse_doc(doc: &str) -> Result<Record> {
    Ok(serde_json::from_str(doc)?)
}
