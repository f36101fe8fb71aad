//! Catalog access - which stores and indexes physically exist

use rusqlite::{Connection, OptionalExtension, params};
use crate::Result;
use crate::schema::{IndexDescriptor, StoreDescriptor};
use super::schema;

/// Names of every store in the database, sorted
pub fn store_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM daybook_stores ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

pub fn store_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM daybook_stores WHERE name = ?1", [name], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Load the live descriptor of a store
pub fn load_descriptor(conn: &Connection, name: &str) -> Result<Option<StoreDescriptor>> {
    let header = conn
        .query_row(
            "SELECT key_path, auto_increment FROM daybook_stores WHERE name = ?1",
            [name],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
        )
        .optional()?;

    let Some((key_path, auto_increment)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT name, field_path, is_unique FROM daybook_indexes WHERE store = ?1 ORDER BY position",
    )?;
    let indexes = stmt
        .query_map([name], |row| {
            Ok(IndexDescriptor {
                name: row.get(0)?,
                field_path: row.get(1)?,
                unique: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(StoreDescriptor {
        name: name.to_string(),
        key_path,
        auto_increment,
        indexes,
    }))
}

/// Create the table, indexes and catalog rows of a store
pub fn create_store(conn: &Connection, store: &StoreDescriptor) -> Result<()> {
    for stmt in schema::create_store_statements(store) {
        conn.execute(&stmt, [])?;
    }

    conn.execute(
        r#"
        INSERT INTO daybook_stores (name, table_name, key_path, auto_increment, current_key)
        VALUES (?1, ?2, ?3, ?4, 0)
        "#,
        params![store.name, schema::table_name(&store.name), store.key_path, store.auto_increment],
    )?;

    for (position, index) in store.indexes.iter().enumerate() {
        conn.execute(
            r#"
            INSERT INTO daybook_indexes (store, name, field_path, is_unique, position)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![store.name, index.name, index.field_path, index.unique, position as i64],
        )?;
    }
    Ok(())
}

/// Drop a store with all of its records
pub fn drop_store(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(&schema::drop_store_statement(name), [])?;
    conn.execute("DELETE FROM daybook_indexes WHERE store = ?1", [name])?;
    conn.execute("DELETE FROM daybook_stores WHERE name = ?1", [name])?;
    Ok(())
}

pub fn current_key(conn: &Connection, store: &str) -> Result<i64> {
    let key = conn.query_row(
        "SELECT current_key FROM daybook_stores WHERE name = ?1",
        [store],
        |row| row.get(0),
    )?;
    Ok(key)
}

pub fn set_current_key(conn: &Connection, store: &str, key: i64) -> Result<()> {
    conn.execute(
        "UPDATE daybook_stores SET current_key = ?1 WHERE name = ?2",
        params![key, store],
    )?;
    Ok(())
}
