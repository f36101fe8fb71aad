//! CRUD engine - transactional operations on named stores
//!
//! Each call borrows the connection from the [`ConnectionManager`], runs in
//! exactly one transaction and resolves only once that transaction has
//! committed. Per-item results of a batch are gathered inside the
//! transaction and surfaced together; if any item fails the whole batch is
//! rolled back and the caller sees that single error.

use std::sync::Arc;

use rusqlite::ErrorCode;
use serde_json::Value;
use tracing::debug;

use crate::record::{Key, Record};
use crate::schema::StoreDescriptor;
use crate::{Error, Result};
use super::catalog;
use super::connection::ConnectionManager;
use super::cursor::{CursorOptions, Visit};
use super::transaction::{StoreTx, TxMode};

#[derive(Debug, Clone)]
pub struct Engine {
    manager: Arc<ConnectionManager>,
}

impl Engine {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Run `body` in one transaction over `stores` and commit it.
    ///
    /// SQLite failures are classified here: constraint violations become
    /// [`Error::Constraint`], anything else [`Error::Transaction`].
    pub async fn transaction<T>(
        &self,
        stores: &[&str],
        mode: TxMode,
        body: impl FnOnce(&StoreTx<'_>) -> Result<T>,
    ) -> Result<T> {
        self.manager
            .with_connection(|conn| {
                let tx = StoreTx::begin(conn, mode, stores)?;
                let out = body(&tx)?;
                tx.commit()?;
                Ok(out)
            })
            .await
            .map_err(classify)
    }

    /// Insert new records. Returns the assigned keys in input order.
    pub async fn add(&self, store: &str, records: Vec<Record>) -> Result<Vec<Key>> {
        debug!("add {} record(s) to {}", records.len(), store);
        self.transaction(&[store], TxMode::ReadWrite, |tx| {
            records.into_iter().map(|r| tx.add(store, r)).collect()
        })
        .await
    }

    pub async fn add_one(&self, store: &str, record: Record) -> Result<Key> {
        debug!("add 1 record to {}", store);
        self.transaction(&[store], TxMode::ReadWrite, |tx| tx.add(store, record)).await
    }

    /// Insert or replace records by primary key
    pub async fn put(&self, store: &str, records: Vec<Record>) -> Result<Vec<Key>> {
        debug!("put {} record(s) into {}", records.len(), store);
        self.transaction(&[store], TxMode::ReadWrite, |tx| {
            records.into_iter().map(|r| tx.put(store, r)).collect()
        })
        .await
    }

    pub async fn put_one(&self, store: &str, record: Record) -> Result<Key> {
        debug!("put 1 record into {}", store);
        self.transaction(&[store], TxMode::ReadWrite, |tx| tx.put(store, record)).await
    }

    /// Fetch a record; `None` when the key is absent
    pub async fn get(&self, store: &str, key: &Key) -> Result<Option<Record>> {
        self.transaction(&[store], TxMode::ReadOnly, |tx| tx.get(store, key)).await
    }

    pub async fn get_all(&self, store: &str) -> Result<Vec<Record>> {
        self.transaction(&[store], TxMode::ReadOnly, |tx| tx.get_all(store)).await
    }

    pub async fn get_by_index(&self, store: &str, index: &str, value: &Value) -> Result<Vec<Record>> {
        self.transaction(&[store], TxMode::ReadOnly, |tx| tx.get_by_index(store, index, value))
            .await
    }

    pub async fn delete(&self, store: &str, key: &Key) -> Result<()> {
        debug!("delete {} from {}", key, store);
        self.transaction(&[store], TxMode::ReadWrite, |tx| tx.delete(store, key)).await
    }

    pub async fn batch_delete(&self, store: &str, keys: &[Key]) -> Result<()> {
        debug!("delete {} key(s) from {}", keys.len(), store);
        self.transaction(&[store], TxMode::ReadWrite, |tx| {
            keys.iter().try_for_each(|key| tx.delete(store, key))
        })
        .await
    }

    pub async fn clear(&self, store: &str) -> Result<()> {
        debug!("clear {}", store);
        self.transaction(&[store], TxMode::ReadWrite, |tx| tx.clear(store)).await
    }

    pub async fn count(&self, store: &str) -> Result<usize> {
        self.transaction(&[store], TxMode::ReadOnly, |tx| tx.count(store)).await
    }

    /// Traverse a store once in the requested order and return the records
    /// the visitor keeps. Returning [`Visit::Exclude`] only drops the current
    /// record from the result; traversal continues.
    pub async fn cursor<F>(&self, store: &str, options: CursorOptions, visitor: F) -> Result<Vec<Record>>
    where
        F: FnMut(&Record) -> Visit,
    {
        self.transaction(&[store], TxMode::ReadOnly, |tx| tx.scan(store, &options, visitor))
            .await
    }

    /// Names of the stores physically present in the database, sorted
    pub async fn store_names(&self) -> Result<Vec<String>> {
        self.manager.with_connection(|conn| catalog::store_names(conn)).await
    }

    /// Live descriptor of a store as recorded in the database
    pub async fn descriptor(&self, store: &str) -> Result<StoreDescriptor> {
        self.manager
            .with_connection(|conn| catalog::load_descriptor(conn, store))
            .await?
            .ok_or_else(|| Error::UnknownStore(store.to_string()))
    }
}

fn classify(err: Error) -> Error {
    match err {
        Error::Storage(rusqlite::Error::SqliteFailure(e, msg)) if e.code == ErrorCode::ConstraintViolation => {
            Error::Constraint(msg.unwrap_or_else(|| e.to_string()))
        }
        Error::Storage(e) => Error::Transaction(e.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::storage::{CursorDirection, KeyRange};
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn engine() -> Engine {
        let mut registry = SchemaRegistry::new();
        registry
            .declare(
                StoreDescriptor::new("records")
                    .key_path("uid")
                    .auto_increment(true)
                    .index("date")
                    .index("index")
                    .unique_index("slug"),
            )
            .declare(StoreDescriptor::new("notes").key_path("id"));
        let manager = ConnectionManager::in_memory("test", 1, registry).unwrap();
        Engine::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_auto_increment_assigns_unique_keys() {
        let engine = engine();
        let input = record(json!({"date": "2024-01-01", "title": "first"}));

        let keys = engine
            .add("records", vec![input.clone(), input.clone(), input.clone()])
            .await
            .unwrap();
        assert_eq!(keys, vec![Key::Integer(1), Key::Integer(2), Key::Integer(3)]);

        let stored = engine.get("records", &keys[1]).await.unwrap().unwrap();
        let mut expected = input.clone();
        expected.insert("uid".into(), json!(2));
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_explicit_key_advances_generator() {
        let engine = engine();
        engine.add_one("records", record(json!({"uid": 10}))).await.unwrap();
        let next = engine.add_one("records", record(json!({"uid": null}))).await.unwrap();
        assert_eq!(next, Key::Integer(11));

        // A lower explicit key does not move the generator back
        engine.add_one("records", record(json!({"uid": 5}))).await.unwrap();
        let next = engine.add_one("records", record(json!({}))).await.unwrap();
        assert_eq!(next, Key::Integer(12));
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let engine = engine();
        let err = engine.add_one("notes", record(json!({"text": "no id"}))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));

        let err = engine.add_one("notes", record(json!({"id": true}))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_add_duplicate_key_is_constraint_error() {
        let engine = engine();
        engine.add_one("notes", record(json!({"id": "a"}))).await.unwrap();
        let err = engine.add_one("notes", record(json!({"id": "a"}))).await.unwrap_err();
        assert!(matches!(err, Error::Constraint(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_batch_add_is_atomic() {
        let engine = engine();
        let err = engine
            .add(
                "notes",
                vec![record(json!({"id": 1})), record(json!({"id": 2})), record(json!({"id": 1}))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        assert_eq!(engine.count("notes").await.unwrap(), 0);
        assert!(engine.get("notes", &Key::Integer(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_consume_keys() {
        let engine = engine();
        let err = engine
            .add("records", vec![record(json!({"slug": "x"})), record(json!({"slug": "x"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));

        let key = engine.add_one("records", record(json!({"slug": "x"}))).await.unwrap();
        assert_eq!(key, Key::Integer(1));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let engine = engine();
        let note = record(json!({"id": 1, "text": "hello", "tags": ["a", "b"]}));

        engine.put_one("notes", note.clone()).await.unwrap();
        let once = engine.get_all("notes").await.unwrap();
        engine.put_one("notes", note.clone()).await.unwrap();
        let twice = engine.get_all("notes").await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice, vec![note]);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let engine = engine();
        engine.put_one("notes", record(json!({"id": 1, "text": "old"}))).await.unwrap();
        engine.put_one("notes", record(json!({"id": 1, "text": "new"}))).await.unwrap();

        let stored = engine.get("notes", &Key::Integer(1)).await.unwrap().unwrap();
        assert_eq!(stored["text"], json!("new"));
        assert_eq!(engine.count("notes").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_index_violation_on_put() {
        let engine = engine();
        engine.put_one("records", record(json!({"slug": "same"}))).await.unwrap();
        let err = engine.put_one("records", record(json!({"slug": "same"}))).await.unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));

        // Records without the field are not indexed and never collide
        engine.put_one("records", record(json!({"title": "a"}))).await.unwrap();
        engine.put_one("records", record(json!({"title": "b"}))).await.unwrap();
        assert_eq!(engine.count("records").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let engine = engine();
        engine.put_one("notes", record(json!({"id": 1}))).await.unwrap();
        engine.put_one("notes", record(json!({"id": 2}))).await.unwrap();

        engine.delete("notes", &Key::Integer(1)).await.unwrap();
        engine.delete("notes", &Key::Integer(1)).await.unwrap();
        engine.delete("notes", &Key::Integer(99)).await.unwrap();

        let remaining = engine.get_all("notes").await.unwrap();
        assert_eq!(remaining, vec![record(json!({"id": 2}))]);
    }

    #[tokio::test]
    async fn test_batch_delete_and_clear() {
        let engine = engine();
        for id in 1..=5 {
            engine.put_one("notes", record(json!({"id": id}))).await.unwrap();
        }

        engine
            .batch_delete("notes", &[Key::Integer(1), Key::Integer(3), Key::Integer(42)])
            .await
            .unwrap();
        assert_eq!(engine.count("notes").await.unwrap(), 3);

        engine.clear("notes").await.unwrap();
        assert_eq!(engine.count("notes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let engine = engine();
        assert!(engine.get("notes", &Key::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_index_scenario() {
        let engine = engine();
        engine
            .add(
                "records",
                vec![
                    record(json!({"date": "2024-01-01", "title": "one"})),
                    record(json!({"date": "2024-01-02", "title": "two"})),
                    record(json!({"date": "2024-01-01", "title": "three"})),
                ],
            )
            .await
            .unwrap();

        let found = engine.get_by_index("records", "date", &json!("2024-01-01")).await.unwrap();
        let titles: Vec<_> = found.iter().map(|r| r["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["one", "three"]);

        let none = engine.get_by_index("records", "date", &json!("1999-12-31")).await.unwrap();
        assert!(none.is_empty());

        let by_number = engine.get_by_index("records", "index", &json!(0)).await.unwrap();
        assert!(by_number.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_store_and_index() {
        let engine = engine();
        assert!(matches!(engine.get_all("ghost").await, Err(Error::UnknownStore(_))));
        assert!(matches!(
            engine.get_by_index("records", "missing", &json!(1)).await,
            Err(Error::UnknownIndex(_))
        ));
    }

    #[tokio::test]
    async fn test_cursor_exclude_keeps_traversing() {
        let engine = engine();
        for id in 1..=6 {
            engine.put_one("notes", record(json!({"id": id}))).await.unwrap();
        }

        let mut visited = Vec::new();
        let kept = engine
            .cursor("notes", CursorOptions::new(), |r| {
                let id = r["id"].as_i64().unwrap();
                visited.push(id);
                if id % 2 == 0 { Visit::Keep } else { Visit::Exclude }
            })
            .await
            .unwrap();

        assert_eq!(visited, vec![1, 2, 3, 4, 5, 6]);
        let ids: Vec<_> = kept.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_cursor_direction_and_range() {
        let engine = engine();
        for id in 1..=6 {
            engine.put_one("notes", record(json!({"id": id}))).await.unwrap();
        }

        let options = CursorOptions::new()
            .direction(CursorDirection::Prev)
            .range(KeyRange::bound(2i64, 5i64, false, true));
        let kept = engine.cursor("notes", options, |_| Visit::Keep).await.unwrap();
        let ids: Vec<_> = kept.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn test_index_cursor_unique() {
        let engine = engine();
        engine
            .add(
                "records",
                vec![
                    record(json!({"date": "2024-01-02"})),
                    record(json!({"date": "2024-01-01"})),
                    record(json!({"date": "2024-01-02"})),
                    record(json!({"title": "undated"})),
                    record(json!({"date": "2024-01-03"})),
                ],
            )
            .await
            .unwrap();

        let uids = |records: Vec<Record>| -> Vec<i64> {
            records.iter().map(|r| r["uid"].as_i64().unwrap()).collect()
        };

        let all = engine
            .cursor("records", CursorOptions::new().index("date"), |_| Visit::Keep)
            .await
            .unwrap();
        assert_eq!(uids(all), vec![2, 1, 3, 5]);

        let next_unique = engine
            .cursor(
                "records",
                CursorOptions::new().index("date").direction(CursorDirection::NextUnique),
                |_| Visit::Keep,
            )
            .await
            .unwrap();
        assert_eq!(uids(next_unique), vec![2, 1, 5]);

        let prev_unique = engine
            .cursor(
                "records",
                CursorOptions::new().index("date").direction(CursorDirection::PrevUnique),
                |_| Visit::Keep,
            )
            .await
            .unwrap();
        assert_eq!(uids(prev_unique), vec![5, 1, 2]);

        let only = engine
            .cursor(
                "records",
                CursorOptions::new().index("date").range(KeyRange::only("2024-01-02")),
                |_| Visit::Keep,
            )
            .await
            .unwrap();
        assert_eq!(uids(only), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_non_key_values_are_not_indexed() {
        let engine = engine();
        engine
            .add(
                "records",
                vec![
                    record(json!({"index": true})),
                    record(json!({"index": 1})),
                    record(json!({"index": [1]})),
                    record(json!({"index": false, "slug": "a"})),
                    record(json!({"index": 0, "slug": true})),
                    record(json!({"slug": true})),
                ],
            )
            .await
            .unwrap();

        let ones = engine.get_by_index("records", "index", &json!(1)).await.unwrap();
        assert_eq!(ones.len(), 1);
        assert_eq!(ones[0]["uid"], json!(2));

        let zeros = engine.get_by_index("records", "index", &json!(0)).await.unwrap();
        assert_eq!(zeros.len(), 1);
        assert_eq!(zeros[0]["uid"], json!(5));

        let indexed = engine
            .cursor("records", CursorOptions::new().index("index"), |_| Visit::Keep)
            .await
            .unwrap();
        let uids: Vec<_> = indexed.iter().map(|r| r["uid"].as_i64().unwrap()).collect();
        assert_eq!(uids, vec![5, 2]);
    }

    #[tokio::test]
    async fn test_store_names_and_descriptor() {
        let engine = engine();
        assert_eq!(engine.store_names().await.unwrap(), vec!["notes", "records"]);

        let descriptor = engine.descriptor("records").await.unwrap();
        assert_eq!(descriptor.key_path, "uid");
        assert!(descriptor.auto_increment);
        assert_eq!(descriptor.indexes.len(), 3);
        assert!(descriptor.find_index("slug").unwrap().unique);
        assert!(matches!(engine.descriptor("ghost").await, Err(Error::UnknownStore(_))));
    }
}
