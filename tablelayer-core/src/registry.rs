//! The schema registry: the immutable set of declared tables.
//!
//! The registry is built once from static configuration and shared (behind an
//! `Arc`) by the query engine and the reconciler. Every engine operation starts
//! with a registry lookup, so an unknown table name fails before any I/O.

use std::collections::HashSet;

use crate::{
    error::{TableLayerError, TableLayerResult},
    schema::{PRIMARY_INDEX, TableDefinition},
};

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: Vec<TableDefinition>,
}

impl SchemaRegistry {
    /// Builds a registry from table definitions.
    ///
    /// Reserved properties are added to every definition. Fails with
    /// [`TableLayerError::InvalidDocument`] on duplicate table names, duplicate index
    /// names within a table, or an index that reuses the primary index name.
    pub fn new(tables: impl IntoIterator<Item = TableDefinition>) -> TableLayerResult<Self> {
        let mut seen = HashSet::new();
        let mut tables = tables.into_iter().collect::<Vec<_>>();

        for table in &mut tables {
            if !seen.insert(table.name.clone()) {
                return Err(TableLayerError::InvalidDocument(format!(
                    "table {} is declared more than once",
                    table.name
                )));
            }

            let mut index_names = HashSet::new();
            for index in &table.indexes {
                if index.name == PRIMARY_INDEX {
                    return Err(TableLayerError::InvalidDocument(format!(
                        "index name {} is reserved (table {})",
                        PRIMARY_INDEX, table.name
                    )));
                }
                if !index_names.insert(index.name.as_str()) {
                    return Err(TableLayerError::InvalidDocument(format!(
                        "index {} is declared more than once on table {}",
                        index.name, table.name
                    )));
                }
            }

            table.ensure_reserved();
        }

        Ok(Self { tables })
    }

    /// Parses a JSON array of table definitions.
    pub fn from_json(json: &str) -> TableLayerResult<Self> {
        Self::new(serde_json::from_str::<Vec<TableDefinition>>(json)?)
    }

    /// Resolves a table by name.
    pub fn get(&self, name: &str) -> TableLayerResult<&TableDefinition> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .ok_or_else(|| TableLayerError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.iter().any(|table| table.name == name)
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }

    /// Tables whose `list_roles` include `role`.
    pub fn listable_by<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a TableDefinition> {
        self.tables
            .iter()
            .filter(move |table| table.list_roles.iter().any(|r| r == role))
    }
}
