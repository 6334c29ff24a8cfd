//! The query engine: the entry point for every table operation.
//!
//! A [`QueryEngine`] owns the backend, the shared [`SchemaRegistry`] and the
//! [`EngineOptions`]. All collaborators are passed in at construction; nothing
//! is looked up from ambient state.
//!
//! # Example
//!
//! ```ignore
//! use tablelayer_core::{engine::QueryEngine, trace::TracedBackend};
//!
//! let engine = QueryEngine::new(TracedBackend::new(backend), registry);
//! engine.reconciler().reconcile().await?;
//!
//! let users = engine.table("user")?;
//! let alice = users.insert(doc! { "email": "a@b.com", "first_name": "A", "last_name": "B", "role": "user" }, &[]).await?;
//! ```

use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    codec::IdentifierPolicy,
    error::TableLayerResult,
    query::Sort,
    reconcile::Reconciler,
    registry::SchemaRegistry,
    schema::{CREATED_DATE_FIELD, IndexDeclaration},
    table::Table,
};

/// Tunables shared by every table handle of an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Which fields hold native identifiers in storage.
    pub identifiers: IdentifierPolicy,
    /// Fields whose requested sort direction is inverted (e.g. birth dates, so
    /// that "ascending" means youngest first).
    pub reversed_sort_fields: Vec<String>,
    /// Sort applied when a filter call does not ask for one.
    pub default_sort: Sort,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifiers(mut self, identifiers: IdentifierPolicy) -> Self {
        self.identifiers = identifiers;
        self
    }

    pub fn reversed_sort_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.reversed_sort_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_sort(mut self, sort: Sort) -> Self {
        self.default_sort = sort;
        self
    }

    /// Applies the reversal override to a requested sort key.
    pub(crate) fn effective_sort(&self, sort: Sort) -> Sort {
        if self.reversed_sort_fields.iter().any(|field| *field == sort.field) {
            Sort::new(sort.field, sort.direction.reversed())
        } else {
            sort
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            identifiers: IdentifierPolicy::default(),
            reversed_sort_fields: vec!["dob".to_string()],
            default_sort: Sort::asc(CREATED_DATE_FIELD),
        }
    }
}

/// Generic, schema-driven access to every declared table.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct QueryEngine<B: StoreBackend> {
    backend: B,
    registry: Arc<SchemaRegistry>,
    options: EngineOptions,
}

impl<B: StoreBackend> QueryEngine<B> {
    /// Creates an engine over `backend` with default options.
    pub fn new(backend: B, registry: impl Into<Arc<SchemaRegistry>>) -> Self {
        Self {
            backend,
            registry: registry.into(),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Resolves a declared table into a handle exposing record operations.
    ///
    /// # Errors
    ///
    /// Returns [`TableLayerError::UnknownTable`](crate::error::TableLayerError::UnknownTable)
    /// if the registry does not declare `name`. No backend call is made.
    pub fn table<'a>(&'a self, name: &str) -> TableLayerResult<Table<'a, B>> {
        let definition = self.registry.get(name)?;
        Ok(Table::new(definition, &self.backend, &self.options))
    }

    /// A reconciler sharing this engine's backend and registry.
    pub fn reconciler(&self) -> Reconciler<&B> {
        Reconciler::new(&self.backend, self.registry.clone())
    }

    /// Lists every live collection, declared or not.
    pub async fn list_tables(&self) -> TableLayerResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Creates a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection already exists or creation fails.
    pub async fn create_table(&self, name: &str) -> TableLayerResult<()> {
        self.backend.create_collection(name).await
    }

    /// Drops a collection and every record in it.
    pub async fn drop_table(&self, name: &str) -> TableLayerResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists the live index names of a collection, the primary index included.
    ///
    /// A missing collection yields an empty list.
    pub async fn list_indexes(&self, table: &str) -> TableLayerResult<Vec<String>> {
        self.backend.list_indexes(table).await
    }

    pub async fn create_index(&self, table: &str, index: &IndexDeclaration) -> TableLayerResult<()> {
        self.backend.create_index(table, index).await
    }

    pub async fn drop_index(&self, table: &str, name: &str) -> TableLayerResult<()> {
        self.backend.drop_index(table, name).await
    }

    /// Shuts down the underlying backend.
    pub async fn shutdown(self) -> TableLayerResult<()> {
        self.backend.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortDirection;

    #[test]
    fn birth_dates_sort_inverted() {
        let options = EngineOptions::default();

        assert_eq!(options.effective_sort(Sort::asc("dob")), Sort::desc("dob"));
        assert_eq!(options.effective_sort(Sort::asc("email")), Sort::asc("email"));
    }

    #[test]
    fn reversal_list_is_configurable() {
        let options = EngineOptions::new().reversed_sort_fields(["rank"]);

        assert_eq!(
            options.effective_sort(Sort::new("rank", SortDirection::Desc)).direction,
            SortDirection::Asc
        );
        assert_eq!(options.effective_sort(Sort::asc("dob")), Sort::asc("dob"));
    }
}
