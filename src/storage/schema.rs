//! Database schema definitions

use crate::record::json_path_literal;
use crate::schema::{IndexDescriptor, StoreDescriptor};

/// SQL to create the store catalog. `current_key` is the key generator state.
pub const CREATE_STORES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS daybook_stores (
    name TEXT PRIMARY KEY,
    table_name TEXT NOT NULL UNIQUE,
    key_path TEXT NOT NULL,
    auto_increment INTEGER NOT NULL DEFAULT 0,
    current_key INTEGER NOT NULL DEFAULT 0
)
"#;

/// SQL to create the index catalog
pub const CREATE_INDEXES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS daybook_indexes (
    store TEXT NOT NULL,
    name TEXT NOT NULL,
    field_path TEXT NOT NULL,
    is_unique INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL,
    PRIMARY KEY (store, name)
)
"#;

/// All catalog creation statements
pub fn catalog_statements() -> Vec<&'static str> {
    vec![CREATE_STORES_TABLE, CREATE_INDEXES_TABLE]
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Physical table backing a store
pub fn table_name(store: &str) -> String {
    format!("store:{}", store)
}

pub fn index_name(store: &str, index: &str) -> String {
    format!("index:{}:{}", store, index)
}

/// SQL expression yielding the indexed value of a record
pub fn index_expr(field_path: &str) -> String {
    format!("json_extract(doc, {})", json_path_literal(field_path))
}

/// Condition selecting records whose field holds a valid key: a number or
/// a string. Booleans, nulls, objects and arrays are left out of indexes.
pub fn index_filter(field_path: &str) -> String {
    format!(
        "json_type(doc, {}) IN ('integer', 'real', 'text')",
        json_path_literal(field_path)
    )
}

/// Statements creating the table and indexes of one store
pub fn create_store_statements(store: &StoreDescriptor) -> Vec<String> {
    let table = quote_ident(&table_name(&store.name));
    let mut stmts = vec![format!(
        "CREATE TABLE {} (pk PRIMARY KEY NOT NULL, doc TEXT NOT NULL)",
        table
    )];
    stmts.extend(store.indexes.iter().map(|index| create_index_statement(&store.name, index)));
    stmts
}

fn create_index_statement(store: &str, index: &IndexDescriptor) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({}) WHERE {}",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index_name(store, &index.name)),
        quote_ident(&table_name(store)),
        index_expr(&index.field_path),
        index_filter(&index.field_path),
    )
}

pub fn drop_store_statement(store: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(&table_name(store)))
}
