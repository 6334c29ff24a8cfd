//! Storage backend abstraction for the access layer.
//!
//! This module defines the trait that abstracts over document databases, so the
//! query engine and the reconciler can run against MongoDB in production and an
//! in-memory store in tests.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait is a thin, collection-scoped set of async
//! primitives: bulk insert, replace-or-create, field patches, deletes, queries,
//! counts, and collection and index management. It knows nothing about table
//! definitions or validation; records arrive in storage form (`_id` holding a
//! native [`ObjectId`]) and leave in storage form.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use tablelayer_core::backend::StoreBackend;
//! use bson::{doc, oid::ObjectId};
//!
//! let backend = MyBackendImpl::new();
//!
//! backend
//!     .insert_documents(vec![doc! { "_id": ObjectId::new(), "name": "Alice" }], "user")
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Document, oid::ObjectId};
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::TableLayerResult,
    query::{Expr, Query},
    schema::IndexDeclaration,
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. A single backend instance is shared by every caller of the engine.
///
/// # Atomicity
///
/// Only single-document atomicity is assumed. Bulk methods may be applied
/// sequentially by a backend, in which case a failure partway leaves the earlier
/// documents written.
///
/// # Error Handling
///
/// Store-level failures are reported as
/// [`TableLayerError::Backend`](crate::error::TableLayerError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection in one bulk write.
    ///
    /// # Arguments
    ///
    /// * `documents` - Documents in storage form, each carrying its `_id`
    /// * `collection` - The name of the collection to insert into
    ///
    /// # Errors
    ///
    /// Fails if a document with the same `_id` already exists.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> TableLayerResult<()>;

    /// Replaces documents by id, creating the ones that do not exist yet.
    ///
    /// # Arguments
    ///
    /// * `documents` - (id, full replacement document) pairs
    /// * `collection` - The name of the collection to write to
    async fn upsert_documents(
        &self,
        documents: Vec<(ObjectId, Document)>,
        collection: &str,
    ) -> TableLayerResult<()>;

    /// Applies field-level patches to existing documents.
    ///
    /// Only the fields present in each patch are written; the rest of the
    /// document is left unchanged. Patches addressing a missing id are skipped.
    ///
    /// # Arguments
    ///
    /// * `patches` - (id, fields to set) pairs
    /// * `collection` - The name of the collection containing the documents
    async fn update_documents(
        &self,
        patches: Vec<(ObjectId, Document)>,
        collection: &str,
    ) -> TableLayerResult<()>;

    /// Sets the patch fields on every document matching `filter`.
    ///
    /// A `None` filter matches every document of the collection.
    ///
    /// # Returns
    ///
    /// The number of documents matched.
    async fn update_matching(
        &self,
        filter: Option<Expr>,
        patch: Document,
        collection: &str,
    ) -> TableLayerResult<u64>;

    /// Deletes documents from a collection by their IDs.
    ///
    /// Missing ids are silently skipped (idempotent operation).
    async fn delete_documents(&self, ids: Vec<ObjectId>, collection: &str) -> TableLayerResult<()>;

    /// Deletes every document matching `filter`.
    ///
    /// # Returns
    ///
    /// The number of documents deleted.
    async fn delete_matching(&self, filter: Expr, collection: &str) -> TableLayerResult<u64>;

    /// Queries documents in a collection using a structured query.
    ///
    /// Filter, projection, sort keys, limit and offset are all applied by the
    /// backend.
    ///
    /// # Returns
    ///
    /// Matching documents in storage form. A missing collection yields no documents.
    ///
    /// # See Also
    ///
    /// - [`Query`] for constructing queries
    /// - [`crate::query::Filter`] for building filter expressions
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> TableLayerResult<Vec<Document>>;

    /// Counts the documents matching `filter` (all documents when `None`).
    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> TableLayerResult<u64>;

    /// Creates a new, empty collection.
    ///
    /// The collection starts with the primary index `_id_` only.
    async fn create_collection(&self, name: &str) -> TableLayerResult<()>;

    /// Drops (deletes) a collection and all its documents.
    ///
    /// # Warning
    ///
    /// This operation is irreversible.
    async fn drop_collection(&self, name: &str) -> TableLayerResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> TableLayerResult<Vec<String>>;

    /// Lists the index names of a collection, primary index included.
    ///
    /// A missing collection has no indexes; this is not an error.
    async fn list_indexes(&self, collection: &str) -> TableLayerResult<Vec<String>>;

    /// Creates a named index on a collection.
    ///
    /// # Errors
    ///
    /// If `index.unique` is set and existing documents violate the constraint,
    /// the backend returns an error.
    async fn create_index(
        &self,
        collection: &str,
        index: &IndexDeclaration,
    ) -> TableLayerResult<()>;

    /// Removes an index from a collection by name.
    async fn drop_index(&self, collection: &str, name: &str) -> TableLayerResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external
    /// connections should override this.
    async fn shutdown(self) -> TableLayerResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

macro_rules! forward_backend {
    ($target:ty, $($deref:tt)+) => {
        #[async_trait]
        impl<B> StoreBackend for $target
        where
            B: StoreBackend,
        {
            async fn insert_documents(
                &self,
                documents: Vec<Document>,
                collection: &str,
            ) -> TableLayerResult<()> {
                ($($deref)+ self).insert_documents(documents, collection).await
            }

            async fn upsert_documents(
                &self,
                documents: Vec<(ObjectId, Document)>,
                collection: &str,
            ) -> TableLayerResult<()> {
                ($($deref)+ self).upsert_documents(documents, collection).await
            }

            async fn update_documents(
                &self,
                patches: Vec<(ObjectId, Document)>,
                collection: &str,
            ) -> TableLayerResult<()> {
                ($($deref)+ self).update_documents(patches, collection).await
            }

            async fn update_matching(
                &self,
                filter: Option<Expr>,
                patch: Document,
                collection: &str,
            ) -> TableLayerResult<u64> {
                ($($deref)+ self).update_matching(filter, patch, collection).await
            }

            async fn delete_documents(
                &self,
                ids: Vec<ObjectId>,
                collection: &str,
            ) -> TableLayerResult<()> {
                ($($deref)+ self).delete_documents(ids, collection).await
            }

            async fn delete_matching(&self, filter: Expr, collection: &str) -> TableLayerResult<u64> {
                ($($deref)+ self).delete_matching(filter, collection).await
            }

            async fn query_documents(
                &self,
                query: Query,
                collection: &str,
            ) -> TableLayerResult<Vec<Document>> {
                ($($deref)+ self).query_documents(query, collection).await
            }

            async fn count_documents(
                &self,
                filter: Option<Expr>,
                collection: &str,
            ) -> TableLayerResult<u64> {
                ($($deref)+ self).count_documents(filter, collection).await
            }

            async fn create_collection(&self, name: &str) -> TableLayerResult<()> {
                ($($deref)+ self).create_collection(name).await
            }

            async fn drop_collection(&self, name: &str) -> TableLayerResult<()> {
                ($($deref)+ self).drop_collection(name).await
            }

            async fn list_collections(&self) -> TableLayerResult<Vec<String>> {
                ($($deref)+ self).list_collections().await
            }

            async fn list_indexes(&self, collection: &str) -> TableLayerResult<Vec<String>> {
                ($($deref)+ self).list_indexes(collection).await
            }

            async fn create_index(
                &self,
                collection: &str,
                index: &IndexDeclaration,
            ) -> TableLayerResult<()> {
                ($($deref)+ self).create_index(collection, index).await
            }

            async fn drop_index(&self, collection: &str, name: &str) -> TableLayerResult<()> {
                ($($deref)+ self).drop_index(collection, name).await
            }
        }
    };
}

forward_backend!(&B, *);
forward_backend!(Arc<B>, **);

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> TableLayerResult<Self::Backend>;
}
