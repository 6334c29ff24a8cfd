use async_trait::async_trait;
use bson::{Document, doc, oid::ObjectId};
use std::sync::Mutex;
use tablelayer::{memory::InMemoryStore, prelude::*, reconcile::IndexRef};

/// Forwards to an in-memory store and records every schema-changing call.
#[derive(Debug, Default)]
struct RecordingBackend {
    inner: InMemoryStore,
    calls: Mutex<Vec<String>>,
}

impl RecordingBackend {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl StoreBackend for RecordingBackend {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> TableLayerResult<()> {
        self.inner.insert_documents(documents, collection).await
    }

    async fn upsert_documents(&self, documents: Vec<(ObjectId, Document)>, collection: &str) -> TableLayerResult<()> {
        self.inner.upsert_documents(documents, collection).await
    }

    async fn update_documents(&self, patches: Vec<(ObjectId, Document)>, collection: &str) -> TableLayerResult<()> {
        self.inner.update_documents(patches, collection).await
    }

    async fn update_matching(&self, filter: Option<Expr>, patch: Document, collection: &str) -> TableLayerResult<u64> {
        self.inner.update_matching(filter, patch, collection).await
    }

    async fn delete_documents(&self, ids: Vec<ObjectId>, collection: &str) -> TableLayerResult<()> {
        self.inner.delete_documents(ids, collection).await
    }

    async fn delete_matching(&self, filter: Expr, collection: &str) -> TableLayerResult<u64> {
        self.inner.delete_matching(filter, collection).await
    }

    async fn query_documents(&self, query: Query, collection: &str) -> TableLayerResult<Vec<Document>> {
        self.inner.query_documents(query, collection).await
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> TableLayerResult<u64> {
        self.inner.count_documents(filter, collection).await
    }

    async fn create_collection(&self, name: &str) -> TableLayerResult<()> {
        self.record(format!("create_collection {}", name));
        self.inner.create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> TableLayerResult<()> {
        self.record(format!("drop_collection {}", name));
        self.inner.drop_collection(name).await
    }

    async fn list_collections(&self) -> TableLayerResult<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn list_indexes(&self, collection: &str) -> TableLayerResult<Vec<String>> {
        self.inner.list_indexes(collection).await
    }

    async fn create_index(&self, collection: &str, index: &IndexDeclaration) -> TableLayerResult<()> {
        self.record(format!("create_index {}.{}", collection, index.name));
        self.inner.create_index(collection, index).await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> TableLayerResult<()> {
        self.record(format!("drop_index {}.{}", collection, name));
        self.inner.drop_index(collection, name).await
    }
}

fn user_table() -> TableDefinition {
    TableDefinition::builder("user")
        .required(["email"])
        .property("email", Property::string())
        .index(IndexDeclaration::builder("email_v1").ascending("email").unique().build())
        .build()
}

fn registry() -> SchemaRegistry {
    SchemaRegistry::new([
        user_table(),
        TableDefinition::builder("category")
            .property("name", Property::string())
            .build(),
    ])
    .unwrap()
}

#[tokio::test]
async fn empty_store_gets_every_declared_table_and_index() {
    let backend = RecordingBackend::default();

    let changes = Reconciler::new(&backend, registry()).reconcile().await.unwrap();

    assert_eq!(changes.created_tables, vec!["user", "category"]);
    assert!(changes.dropped_tables.is_empty());
    assert_eq!(
        changes.created_indexes,
        vec![IndexRef { table: "user".into(), index: "email_v1".into() }]
    );

    let mut calls = backend.take_calls();
    calls.sort();
    assert_eq!(
        calls,
        vec![
            "create_collection category",
            "create_collection user",
            "create_index user.email_v1",
        ]
    );
    assert_eq!(
        backend.list_indexes("user").await.unwrap(),
        vec!["_id_", "email_v1"]
    );
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let backend = RecordingBackend::default();
    let reconciler = Reconciler::new(&backend, registry());
    reconciler.reconcile().await.unwrap();
    backend.take_calls();

    let changes = reconciler.reconcile().await.unwrap();

    assert!(changes.is_empty());
    assert!(backend.take_calls().is_empty());
}

#[tokio::test]
async fn missing_index_is_created_exactly_once() {
    let backend = RecordingBackend::default();
    backend.inner.create_collection("user").await.unwrap();
    backend.inner.create_collection("category").await.unwrap();

    Reconciler::new(&backend, registry()).reconcile().await.unwrap();

    assert_eq!(backend.take_calls(), vec!["create_index user.email_v1"]);
}

#[tokio::test]
async fn undeclared_collections_and_indexes_are_dropped() {
    let backend = RecordingBackend::default();
    backend.inner.create_collection("user").await.unwrap();
    backend.inner.create_collection("category").await.unwrap();
    backend.inner.create_collection("legacy").await.unwrap();
    backend
        .inner
        .create_index("user", &IndexDeclaration::builder("email_v1").ascending("email").unique().build())
        .await
        .unwrap();
    backend
        .inner
        .create_index("category", &IndexDeclaration::builder("name_v1").ascending("name").build())
        .await
        .unwrap();

    let plan = Reconciler::new(&backend, registry()).plan().await.unwrap();
    assert_eq!(plan.dropped_tables, vec!["legacy"]);
    assert_eq!(
        plan.dropped_indexes,
        vec![IndexRef { table: "category".into(), index: "name_v1".into() }]
    );
    assert!(backend.take_calls().is_empty());

    let changes = Reconciler::new(&backend, registry()).reconcile().await.unwrap();

    assert_eq!(changes, plan);
    let mut calls = backend.take_calls();
    calls.sort();
    assert_eq!(calls, vec!["drop_collection legacy", "drop_index category.name_v1"]);
    assert_eq!(backend.list_collections().await.unwrap(), vec!["category", "user"]);
    assert_eq!(backend.list_indexes("category").await.unwrap(), vec!["_id_"]);
}

#[tokio::test]
async fn table_changes_finish_before_index_work() {
    let backend = RecordingBackend::default();
    backend.inner.create_collection("category").await.unwrap();
    backend.inner.create_collection("legacy").await.unwrap();
    backend
        .inner
        .create_index("category", &IndexDeclaration::builder("name_v1").ascending("name").build())
        .await
        .unwrap();

    Reconciler::new(&backend, registry()).reconcile().await.unwrap();

    let calls = backend.take_calls();
    assert_eq!(calls.len(), 4);
    let last_table_call = calls.iter().rposition(|call| call.contains("_collection ")).unwrap();
    let first_index_call = calls.iter().position(|call| call.contains("_index ")).unwrap();
    assert!(
        last_table_call < first_index_call,
        "table work interleaved with index work: {:?}",
        calls
    );
    assert!(calls.contains(&"create_collection user".to_string()));
    assert!(calls.contains(&"drop_collection legacy".to_string()));
    assert!(calls.contains(&"create_index user.email_v1".to_string()));
    assert!(calls.contains(&"drop_index category.name_v1".to_string()));
}

#[tokio::test]
async fn failed_step_names_its_target() {
    let backend = InMemoryStore::new();
    backend.create_collection("user").await.unwrap();
    backend
        .insert_documents(
            vec![
                doc! { "_id": ObjectId::new(), "email": "a@b.com" },
                doc! { "_id": ObjectId::new(), "email": "a@b.com" },
            ],
            "user",
        )
        .await
        .unwrap();
    let registry = SchemaRegistry::new([user_table()]).unwrap();

    let err = Reconciler::new(&backend, registry).reconcile().await.unwrap_err();

    assert!(matches!(
        err,
        TableLayerError::Reconciliation { ref action, ref target, .. }
            if action == "create index" && target == "user.email_v1"
    ));
}

#[tokio::test]
async fn engine_reconciler_shares_the_backend() {
    let engine = QueryEngine::new(TracedBackend::new(InMemoryStore::new()), registry());

    engine.reconciler().reconcile().await.unwrap();

    assert_eq!(engine.list_tables().await.unwrap(), vec!["category", "user"]);
    assert_eq!(engine.list_indexes("user").await.unwrap(), vec!["_id_", "email_v1"]);
    assert!(engine.reconciler().plan().await.unwrap().is_empty());
}
