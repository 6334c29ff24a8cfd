use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream::iter};
use bson::{Document, doc, oid::ObjectId};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::ErrorKind,
    options::{ClientOptions, FindOptions, IndexOptions},
};
use tracing::debug;
use tablelayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{TableLayerError, TableLayerResult},
    query::{Expr, Query, SortDirection},
    schema::IndexDeclaration,
};

use crate::{query::MongoQueryTranslator, sanitizer::KeySanitizer};

/// Server error code for operations addressing a missing collection.
const NAMESPACE_NOT_FOUND: i32 = 26;

/// Environment variable holding the connection string.
pub const URI_ENV: &str = "TABLELAYER_MONGODB_URI";
/// Environment variable holding the database name.
pub const DATABASE_ENV: &str = "TABLELAYER_MONGODB_DATABASE";

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    fn find_options(query: &Query) -> FindOptions {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = query.offset {
            options.skip = Some(u64::try_from(skip).unwrap_or(u64::MAX));
        }
        if !query.sort.is_empty() {
            options.sort = Some(
                query.sort
                    .iter()
                    .map(|sort| (
                        sort.field.clone(),
                        match sort.direction {
                            SortDirection::Asc => 1.into(),
                            SortDirection::Desc => (-1).into(),
                        },
                    ))
                    .collect(),
            );
        }
        if !query.projection.is_empty() {
            options.projection = Some(
                query.projection
                    .iter()
                    .map(|field| (field.clone(), 1.into()))
                    .collect(),
            );
        }

        options
    }

    async fn shutdown(self) -> TableLayerResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> TableLayerResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        self.get_collection(collection)
            .insert_many(
                documents
                    .into_iter()
                    .map(KeySanitizer::sanitize_document)
                    .collect::<Vec<Document>>(),
            )
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn upsert_documents(&self, documents: Vec<(ObjectId, Document)>, collection: &str) -> TableLayerResult<()> {
        iter(documents)
            .then(async |(id, document)| self.get_collection(collection)
                .replace_one(doc! { "_id": id }, KeySanitizer::sanitize_document(document))
                .upsert(true)
                .await
                .map_err(|e| TableLayerError::Backend(e.to_string()))
            )
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }

    async fn update_documents(&self, patches: Vec<(ObjectId, Document)>, collection: &str) -> TableLayerResult<()> {
        iter(patches.into_iter().filter(|(_, patch)| !patch.is_empty()))
            .then(async |(id, patch)| self.get_collection(collection)
                .update_one(
                    doc! { "_id": id },
                    doc! { "$set": KeySanitizer::sanitize_document(patch) },
                )
                .await
                .map_err(|e| TableLayerError::Backend(e.to_string()))
            )
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }

    async fn update_matching(&self, filter: Option<Expr>, patch: Document, collection: &str) -> TableLayerResult<u64> {
        Ok(
            self.get_collection(collection)
                .update_many(
                    MongoQueryTranslator::translate(filter.as_ref())?,
                    doc! { "$set": KeySanitizer::sanitize_document(patch) },
                )
                .await
                .map_err(|e| TableLayerError::Backend(e.to_string()))?
                .matched_count
        )
    }

    async fn delete_documents(&self, ids: Vec<ObjectId>, collection: &str) -> TableLayerResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.get_collection(collection)
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn delete_matching(&self, filter: Expr, collection: &str) -> TableLayerResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(MongoQueryTranslator::translate(Some(&filter))?)
                .await
                .map_err(|e| TableLayerError::Backend(e.to_string()))?
                .deleted_count
        )
    }

    async fn query_documents(&self, query: Query, collection: &str) -> TableLayerResult<Vec<Document>> {
        // the server reads a zero limit as no limit
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }

        let options = Self::find_options(&query);

        Ok(
            self.get_collection(collection)
                .find(MongoQueryTranslator::translate(query.filter.as_ref())?)
                .with_options(options)
                .await
                .map_err(|e| TableLayerError::Backend(e.to_string()))?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(|e| TableLayerError::Backend(e.to_string()))?
                .into_iter()
                .map(KeySanitizer::restore_document)
                .collect()
        )
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> TableLayerResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))
    }

    async fn create_collection(&self, name: &str) -> TableLayerResult<()> {
        self.client
            .database(&self.database)
            .create_collection(name)
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> TableLayerResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn list_collections(&self) -> TableLayerResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))
    }

    async fn list_indexes(&self, collection: &str) -> TableLayerResult<Vec<String>> {
        match self.get_collection(collection).list_index_names().await {
            Ok(names) => Ok(names),
            Err(error) if matches!(
                &*error.kind,
                ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND
            ) => {
                debug!("Collection {} does not exist, no indexes to list", collection);
                Ok(Vec::new())
            }
            Err(error) => Err(TableLayerError::Backend(error.to_string())),
        }
    }

    async fn create_index(&self, collection: &str, index: &IndexDeclaration) -> TableLayerResult<()> {
        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                .keys(index.keys.clone())
                .options(
                    IndexOptions::builder()
                    .name(index.name.clone())
                    .unique(index.unique)
                    .build()
                )
                .build()
            )
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> TableLayerResult<()> {
        self.get_collection(collection)
            .drop_index(name)
            .await
            .map_err(|e| TableLayerError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn shutdown(self) -> TableLayerResult<()> {
        self.shutdown().await
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }

    /// Reads the connection string and database name from
    /// `TABLELAYER_MONGODB_URI` and `TABLELAYER_MONGODB_DATABASE`.
    pub fn from_env() -> TableLayerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, keyed by the environment variable names.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TableLayerResult<Self> {
        let read = |key: &str| lookup(key)
            .ok_or_else(|| TableLayerError::Initialization(format!("{} is not set", key)));

        Ok(Self::new(&read(URI_ENV)?, &read(DATABASE_ENV)?))
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> TableLayerResult<Self::Backend> {
        debug!("Connecting to MongoDB database {}", self.database);

        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| TableLayerError::Initialization(e.to_string()))?,
            )
            .map_err(|e| TableLayerError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
