//! Call logging for storage backends.
//!
//! [`TracedBackend`] decorates any [`StoreBackend`] and logs each primitive with
//! its collection and elapsed time. It is composed at construction:
//!
//! ```ignore
//! let engine = QueryEngine::new(TracedBackend::new(backend), registry);
//! ```

use async_trait::async_trait;
use bson::{Document, oid::ObjectId};
use std::time::Instant;
use tracing::{debug, error};

use crate::{
    backend::StoreBackend,
    error::TableLayerResult,
    query::{Expr, Query},
    schema::IndexDeclaration,
};

#[derive(Debug, Clone)]
pub struct TracedBackend<B> {
    inner: B,
}

impl<B> TracedBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }
}

fn traced<T>(
    operation: &str,
    target: &str,
    started: Instant,
    result: TableLayerResult<T>,
) -> TableLayerResult<T> {
    let elapsed = started.elapsed();
    match &result {
        Ok(_) => debug!("{} on {} took {:?}", operation, target, elapsed),
        Err(e) => error!("{} on {} failed after {:?}: {}", operation, target, elapsed, e),
    }
    result
}

#[async_trait]
impl<B> StoreBackend for TracedBackend<B>
where
    B: StoreBackend,
{
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> TableLayerResult<()> {
        let started = Instant::now();
        let count = documents.len();
        let result = self.inner.insert_documents(documents, collection).await;
        traced(&format!("insert({count})"), collection, started, result)
    }

    async fn upsert_documents(
        &self,
        documents: Vec<(ObjectId, Document)>,
        collection: &str,
    ) -> TableLayerResult<()> {
        let started = Instant::now();
        let count = documents.len();
        let result = self.inner.upsert_documents(documents, collection).await;
        traced(&format!("upsert({count})"), collection, started, result)
    }

    async fn update_documents(
        &self,
        patches: Vec<(ObjectId, Document)>,
        collection: &str,
    ) -> TableLayerResult<()> {
        let started = Instant::now();
        let count = patches.len();
        let result = self.inner.update_documents(patches, collection).await;
        traced(&format!("update({count})"), collection, started, result)
    }

    async fn update_matching(
        &self,
        filter: Option<Expr>,
        patch: Document,
        collection: &str,
    ) -> TableLayerResult<u64> {
        let started = Instant::now();
        let result = self.inner.update_matching(filter, patch, collection).await;
        traced("update_matching", collection, started, result)
    }

    async fn delete_documents(&self, ids: Vec<ObjectId>, collection: &str) -> TableLayerResult<()> {
        let started = Instant::now();
        let count = ids.len();
        let result = self.inner.delete_documents(ids, collection).await;
        traced(&format!("delete({count})"), collection, started, result)
    }

    async fn delete_matching(&self, filter: Expr, collection: &str) -> TableLayerResult<u64> {
        let started = Instant::now();
        let result = self.inner.delete_matching(filter, collection).await;
        traced("delete_matching", collection, started, result)
    }

    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> TableLayerResult<Vec<Document>> {
        let started = Instant::now();
        let result = self.inner.query_documents(query, collection).await;
        traced("query", collection, started, result)
    }

    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> TableLayerResult<u64> {
        let started = Instant::now();
        let result = self.inner.count_documents(filter, collection).await;
        traced("count", collection, started, result)
    }

    async fn create_collection(&self, name: &str) -> TableLayerResult<()> {
        let started = Instant::now();
        let result = self.inner.create_collection(name).await;
        traced("create_collection", name, started, result)
    }

    async fn drop_collection(&self, name: &str) -> TableLayerResult<()> {
        let started = Instant::now();
        let result = self.inner.drop_collection(name).await;
        traced("drop_collection", name, started, result)
    }

    async fn list_collections(&self) -> TableLayerResult<Vec<String>> {
        let started = Instant::now();
        let result = self.inner.list_collections().await;
        traced("list_collections", "store", started, result)
    }

    async fn list_indexes(&self, collection: &str) -> TableLayerResult<Vec<String>> {
        let started = Instant::now();
        let result = self.inner.list_indexes(collection).await;
        traced("list_indexes", collection, started, result)
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexDeclaration,
    ) -> TableLayerResult<()> {
        let started = Instant::now();
        let result = self.inner.create_index(collection, index).await;
        traced(&format!("create_index({})", index.name), collection, started, result)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> TableLayerResult<()> {
        let started = Instant::now();
        let result = self.inner.drop_index(collection, name).await;
        traced(&format!("drop_index({name})"), collection, started, result)
    }

    async fn shutdown(self) -> TableLayerResult<()> {
        self.inner.shutdown().await
    }
}
