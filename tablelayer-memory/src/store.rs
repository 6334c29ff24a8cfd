//! In-memory storage implementation for table backends.
//!
//! Collections live in a map guarded by an async-aware read-write lock. Each
//! collection keeps its documents keyed by `_id` and the indexes declared on it,
//! starting with the primary index `_id_`. Indexes are not used to speed up
//! queries; they are kept so unique constraints, text search and schema
//! reconciliation behave as they would against a real database.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use tablelayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{TableLayerError, TableLayerResult},
    query::{Expr, Query, SortDirection},
    record::project,
    schema::{IndexDeclaration, PRIMARY_INDEX, STORAGE_ID_FIELD},
};

use crate::evaluator::{Comparable, DocumentEvaluator};

#[derive(Debug)]
struct MemoryCollection {
    /// Documents ordered by `_id`, which follows insertion order for generated ids.
    documents: BTreeMap<ObjectId, Document>,
    indexes: Vec<IndexDeclaration>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            documents: BTreeMap::new(),
            indexes: vec![
                IndexDeclaration::builder(PRIMARY_INDEX)
                    .ascending(STORAGE_ID_FIELD)
                    .unique()
                    .build(),
            ],
        }
    }

    fn text_fields(&self) -> Vec<String> {
        self.indexes
            .iter()
            .flat_map(IndexDeclaration::text_fields)
            .map(str::to_string)
            .collect()
    }

    fn matching(&self, filter: Option<&Expr>) -> TableLayerResult<Vec<ObjectId>> {
        let Some(filter) = filter else {
            return Ok(self.documents.keys().copied().collect());
        };

        let text_fields = self.text_fields();
        let matched = DocumentEvaluator::filter_documents(self.documents.values(), filter, &text_fields)?;
        Ok(matched
            .into_iter()
            .filter_map(|document| document_id(document).ok())
            .collect())
    }

    /// Fails if `candidate` collides with another document on a unique index.
    fn check_unique(&self, id: &ObjectId, candidate: &Document, collection: &str) -> TableLayerResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique && index.name != PRIMARY_INDEX) {
            let key = |document: &Document| {
                index
                    .keys
                    .keys()
                    .map(|field| document.get(field).cloned().unwrap_or(Bson::Null))
                    .collect::<Vec<_>>()
            };
            let candidate_key = key(candidate);

            let duplicate = self
                .documents
                .iter()
                .any(|(other, document)| other != id && key(document) == candidate_key);
            if duplicate {
                return Err(TableLayerError::Backend(format!(
                    "duplicate key error collection: {} index: {}",
                    collection, index.name
                )));
            }
        }

        Ok(())
    }

    fn write(&mut self, id: ObjectId, document: Document, collection: &str) -> TableLayerResult<()> {
        self.check_unique(&id, &document, collection)?;
        self.documents.insert(id, document);
        Ok(())
    }
}

fn document_id(document: &Document) -> TableLayerResult<ObjectId> {
    document
        .get_object_id(STORAGE_ID_FIELD)
        .map_err(|_| TableLayerError::InvalidDocument("document has no _id".to_string()))
}

type StoreMap = HashMap<String, MemoryCollection>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same data. Collections are created implicitly by the first
/// write, like in the document database.
///
/// # Performance
///
/// Queries scan every document of a collection. This backend is meant for
/// development and tests.
///
/// # Example
///
/// ```ignore
/// use tablelayer_memory::InMemoryStore;
/// use tablelayer_core::backend::StoreBackend;
/// use bson::{doc, oid::ObjectId};
///
/// let store = InMemoryStore::new();
/// store.insert_documents(vec![doc! { "_id": ObjectId::new(), "name": "Alice" }], "user").await?;
/// assert_eq!(store.count_documents(None, "user").await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> collection
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> TableLayerResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        for document in documents {
            let id = document_id(&document)?;

            if collection_map.documents.contains_key(&id) {
                return Err(TableLayerError::Backend(format!(
                    "duplicate key error collection: {} index: {} dup key: {}",
                    collection, PRIMARY_INDEX, id
                )));
            }

            collection_map.write(id, document, collection)?;
        }

        Ok(())
    }

    async fn upsert_documents(&self, documents: Vec<(ObjectId, Document)>, collection: &str) -> TableLayerResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        for (id, mut document) in documents {
            document.insert(STORAGE_ID_FIELD, id);
            collection_map.write(id, document, collection)?;
        }

        Ok(())
    }

    async fn update_documents(&self, patches: Vec<(ObjectId, Document)>, collection: &str) -> TableLayerResult<()> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(());
        };

        for (id, patch) in patches {
            let Some(mut document) = collection_map.documents.get(&id).cloned() else {
                continue;
            };

            document.extend(patch);
            collection_map.write(id, document, collection)?;
        }

        Ok(())
    }

    async fn update_matching(&self, filter: Option<Expr>, patch: Document, collection: &str) -> TableLayerResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let ids = collection_map.matching(filter.as_ref())?;
        for id in &ids {
            if let Some(mut document) = collection_map.documents.get(id).cloned() {
                document.extend(patch.clone());
                collection_map.write(*id, document, collection)?;
            }
        }

        Ok(ids.len() as u64)
    }

    async fn delete_documents(&self, ids: Vec<ObjectId>, collection: &str) -> TableLayerResult<()> {
        let mut store = self.store.write().await;

        if let Some(collection_map) = store.get_mut(collection) {
            for id in ids {
                collection_map.documents.remove(&id);
            }
        }

        Ok(())
    }

    async fn delete_matching(&self, filter: Expr, collection: &str) -> TableLayerResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let ids = collection_map.matching(Some(&filter))?;
        for id in &ids {
            collection_map.documents.remove(id);
        }

        Ok(ids.len() as u64)
    }

    async fn query_documents(&self, query: Query, collection: &str) -> TableLayerResult<Vec<Document>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut documents = collection_map
            .matching(query.filter.as_ref())?
            .into_iter()
            .filter_map(|id| collection_map.documents.get(&id))
            .collect::<Vec<_>>();

        if !query.sort.is_empty() {
            documents.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|sort| {
                        let null = Bson::Null;
                        let left = Comparable::from(a.get(&sort.field).unwrap_or(&null));
                        let right = Comparable::from(b.get(&sort.field).unwrap_or(&null));

                        match sort.direction {
                            SortDirection::Asc => left.sort_cmp(&right),
                            SortDirection::Desc => right.sort_cmp(&left),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        Ok(documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| project(document.clone(), &query.projection))
            .collect())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> TableLayerResult<u64> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(collection_map) => Ok(collection_map.matching(filter.as_ref())?.len() as u64),
            None => Ok(0),
        }
    }

    async fn create_collection(&self, name: &str) -> TableLayerResult<()> {
        let mut store = self.store.write().await;

        if store.contains_key(name) {
            return Err(TableLayerError::Backend(format!("collection already exists: {name}")));
        }

        store.insert(name.to_string(), MemoryCollection::new());
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> TableLayerResult<()> {
        self.store.write().await.remove(name);

        Ok(())
    }

    async fn list_collections(&self) -> TableLayerResult<Vec<String>> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    async fn list_indexes(&self, collection: &str) -> TableLayerResult<Vec<String>> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .map(|collection_map| {
                collection_map
                    .indexes
                    .iter()
                    .map(|index| index.name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, index: &IndexDeclaration) -> TableLayerResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        if let Some(existing) = collection_map.indexes.iter().find(|i| i.name == index.name) {
            if existing.keys == index.keys && existing.unique == index.unique {
                return Ok(());
            }
            return Err(TableLayerError::Backend(format!(
                "index already exists with different options: {}",
                index.name
            )));
        }
        if index.is_text() && collection_map.indexes.iter().any(IndexDeclaration::is_text) {
            return Err(TableLayerError::Backend(format!(
                "collection {collection} already has a text index"
            )));
        }

        collection_map.indexes.push(index.clone());
        let violation = collection_map
            .documents
            .iter()
            .find_map(|(id, document)| collection_map.check_unique(id, document, collection).err());
        if let Some(e) = violation {
            collection_map.indexes.pop();
            return Err(e);
        }

        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> TableLayerResult<()> {
        if name == PRIMARY_INDEX {
            return Err(TableLayerError::Backend("cannot drop _id index".to_string()));
        }

        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Err(TableLayerError::Backend(format!("ns not found: {collection}")));
        };

        let before = collection_map.indexes.len();
        collection_map.indexes.retain(|index| index.name != name);
        if collection_map.indexes.len() == before {
            return Err(TableLayerError::Backend(format!("index not found with name [{name}]")));
        }

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> TableLayerResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
