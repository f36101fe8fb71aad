//! Schema registry - in-memory description of record stores
//!
//! Stores are declared once, before the database is opened. Changing a
//! declaration afterwards requires a version bump, which recreates the store
//! (see [`crate::storage::ConnectionManager`]).

use serde::{Deserialize, Serialize};

/// Key path used when a store does not name one.
pub const DEFAULT_KEY_PATH: &str = "id";

/// A secondary index over one field of a store's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    /// Dotted path of the indexed field, defaults to the index name
    pub field_path: String,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            field_path: name.clone(),
            name,
            unique: false,
        }
    }

    pub fn on(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = field_path.into();
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Descriptor of one named record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub name: String,
    pub key_path: String,
    pub auto_increment: bool,
    pub indexes: Vec<IndexDescriptor>,
}

impl StoreDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: DEFAULT_KEY_PATH.to_string(),
            auto_increment: false,
            indexes: Vec::new(),
        }
    }

    pub fn key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    /// Add an index whose field path is the index name
    pub fn index(self, name: impl Into<String>) -> Self {
        self.with_index(IndexDescriptor::new(name))
    }

    pub fn index_on(self, name: impl Into<String>, field_path: impl Into<String>) -> Self {
        self.with_index(IndexDescriptor::new(name).on(field_path))
    }

    pub fn unique_index(self, name: impl Into<String>) -> Self {
        self.with_index(IndexDescriptor::new(name).unique(true))
    }

    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        match self.indexes.iter_mut().find(|i| i.name == index.name) {
            Some(existing) => *existing = index,
            None => self.indexes.push(index),
        }
        self
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// Ordered set of store descriptors, keyed by store name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    stores: Vec<StoreDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store. Redeclaring a name replaces the earlier descriptor
    /// but keeps its position.
    pub fn declare(&mut self, descriptor: StoreDescriptor) -> &mut Self {
        match self.stores.iter_mut().find(|s| s.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.stores.push(descriptor),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&StoreDescriptor> {
        self.stores.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Descriptors in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &StoreDescriptor> {
        self.stores.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_field_path_defaults_to_name() {
        let index = IndexDescriptor::new("date");
        assert_eq!(index.field_path, "date");
        assert!(!index.unique);

        let index = IndexDescriptor::new("by_title").on("title");
        assert_eq!(index.field_path, "title");
    }

    #[test]
    fn test_store_defaults() {
        let store = StoreDescriptor::new("notes");
        assert_eq!(store.key_path, "id");
        assert!(!store.auto_increment);
        assert!(store.indexes.is_empty());
    }

    #[test]
    fn test_redeclare_last_write_wins() {
        let mut registry = SchemaRegistry::new();
        registry
            .declare(StoreDescriptor::new("records").key_path("uid"))
            .declare(StoreDescriptor::new("tags"))
            .declare(StoreDescriptor::new("records").key_path("uid").auto_increment(true).index("date"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["records", "tags"]);

        let records = registry.get("records").unwrap();
        assert!(records.auto_increment);
        assert_eq!(records.indexes.len(), 1);
    }

    #[test]
    fn test_duplicate_index_name_replaced() {
        let store = StoreDescriptor::new("records")
            .index("title")
            .unique_index("title");
        assert_eq!(store.indexes.len(), 1);
        assert!(store.find_index("title").unwrap().unique);
    }
}
