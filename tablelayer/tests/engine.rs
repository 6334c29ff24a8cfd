use bson::{Bson, DateTime, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tablelayer::{memory::InMemoryStore, prelude::*};

fn registry() -> SchemaRegistry {
    SchemaRegistry::new([
        TableDefinition::builder("user")
            .required(["email", "first_name", "last_name", "role"])
            .property("email", Property::string())
            .property("first_name", Property::string())
            .property("last_name", Property::string())
            .property("role", Property::string().one_of(["admin", "user"]))
            .property("dob", Property::date_time())
            .property("age", Property::integer())
            .index(IndexDeclaration::builder("email_v1").ascending("email").unique().build())
            .build(),
        TableDefinition::builder("category")
            .required(["name"])
            .property("name", Property::string())
            .property("owner_id", Property::string())
            .index(IndexDeclaration::builder("name_text").text("name").build())
            .build(),
    ])
    .unwrap()
}

async fn engine() -> QueryEngine<InMemoryStore> {
    let engine = QueryEngine::new(InMemoryStore::new(), registry());
    engine.reconciler().reconcile().await.unwrap();
    engine
}

fn user(email: &str, first_name: &str) -> Record {
    doc! { "email": email, "first_name": first_name, "last_name": "B", "role": "user" }
}

#[tokio::test]
async fn insert_returns_the_stored_shape() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();

    let inserted = users.insert(user("a@b.com", "A"), &[]).await.unwrap();

    let id = inserted.get_str("id").unwrap();
    assert!(ObjectId::parse_str(id).is_ok());
    assert!(!inserted.contains_key("_id"));
    assert_eq!(inserted.get_str("role").unwrap(), "user");
    assert_eq!(inserted.get_str("status").unwrap(), "active");
    assert_eq!(
        inserted.get_str("created_date").unwrap(),
        inserted.get_str("updated_date").unwrap()
    );

    let found = users.find(id, &[]).await.unwrap().unwrap();
    assert_eq!(found, inserted);
}

#[tokio::test]
async fn insert_ignores_caller_identifier() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let mut record = user("a@b.com", "A");
    let requested = ObjectId::new().to_hex();
    record.insert("id", requested.as_str());

    let inserted = users.insert(record, &[]).await.unwrap();

    assert_ne!(inserted.get_str("id").unwrap(), requested);
}

#[tokio::test]
async fn insert_projects_requested_fields() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();

    let inserted = users.insert(user("a@b.com", "A"), &["email"]).await.unwrap();

    assert_eq!(inserted.keys().collect::<Vec<_>>(), vec!["id", "email"]);
}

#[tokio::test]
async fn missing_required_field_fails_without_writing() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();

    let err = users.insert(doc! { "email": "a@b.com" }, &[]).await.unwrap_err();

    assert!(matches!(err, TableLayerError::Validation { ref path, .. } if path == "first_name"));
    assert!(err.is_caller_error());
    assert_eq!(users.count(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_batch_element_aborts_the_batch() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();

    let result = users
        .insert_many(vec![user("a@b.com", "A"), doc! { "email": "c@d.com" }], &[])
        .await;

    assert!(result.is_err());
    assert_eq!(users.count(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn null_fields_are_not_stored() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let mut record = user("a@b.com", "A");
    record.insert("age", Bson::Null);

    let inserted = users.insert(record, &[]).await.unwrap();

    assert!(!inserted.contains_key("age"));
    assert_eq!(users.count(doc! { "age": { "$exists": true } }).await.unwrap(), 0);
}

#[tokio::test]
async fn native_dates_are_stored_as_strings() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let mut record = user("a@b.com", "A");
    record.insert("dob", DateTime::from_millis(0));

    let inserted = users.insert(record, &[]).await.unwrap();

    assert_eq!(inserted.get_str("dob").unwrap(), "1970-01-01T00:00:00.000Z");
}

#[tokio::test]
async fn find_rejects_malformed_identifiers() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();

    assert!(matches!(
        users.find("not-an-id", &[]).await,
        Err(TableLayerError::InvalidIdentifier(_))
    ));
    assert!(users.find(&ObjectId::new().to_hex(), &[]).await.unwrap().is_none());
}

#[tokio::test]
async fn find_by_looks_up_other_key_fields() {
    let engine = engine().await;
    let categories = engine.table("category").unwrap();
    let owner = ObjectId::new().to_hex();
    categories
        .insert_many(
            vec![
                doc! { "name": "books", "owner_id": owner.as_str() },
                doc! { "name": "games", "owner_id": ObjectId::new().to_hex() },
            ],
            &[],
        )
        .await
        .unwrap();

    let found = categories.find_by("owner_id", owner.as_str(), &["name"]).await.unwrap().unwrap();
    assert_eq!(found.get_str("name").unwrap(), "books");
    assert_eq!(found.get_str("owner_id").ok(), None);

    let users = engine.table("user").unwrap();
    users.insert(user("a@b.com", "A"), &[]).await.unwrap();
    assert!(users.find_by("email", "a@b.com", &[]).await.unwrap().is_some());
    assert!(users.find_by("email", "x@y.com", &[]).await.unwrap().is_none());
}

#[tokio::test]
async fn update_by_id_patches_fields_and_keeps_creation_date() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let inserted = users.insert(user("a@b.com", "A"), &[]).await.unwrap();
    let id = inserted.get_str("id").unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let patch = users
        .update_by_id(
            doc! { "id": id, "first_name": "Z", "created_date": "2000-01-01T00:00:00.000Z" },
            &[],
        )
        .await
        .unwrap();
    assert_eq!(patch.get_str("id").unwrap(), id);

    let found = users.find(id, &[]).await.unwrap().unwrap();
    assert_eq!(found.get_str("first_name").unwrap(), "Z");
    assert_eq!(found.get_str("email").unwrap(), "a@b.com");
    assert_eq!(
        found.get_str("created_date").unwrap(),
        inserted.get_str("created_date").unwrap()
    );
    assert!(found.get_str("updated_date").unwrap() > inserted.get_str("updated_date").unwrap());
}

#[tokio::test]
async fn update_by_id_requires_an_identifier() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();

    let err = users.update_by_id(doc! { "first_name": "Z" }, &[]).await.unwrap_err();

    assert!(matches!(err, TableLayerError::Validation { ref path, .. } if path == "id"));
}

#[tokio::test]
async fn update_by_filter_patches_matching_records() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    users
        .insert_many(vec![user("a@b.com", "A"), user("c@d.com", "C"), user("e@f.com", "E")], &[])
        .await
        .unwrap();

    let matched = users
        .update_by_filter(doc! { "role": "admin" }, doc! { "first_name": { "$in": ["A", "C"] } })
        .await
        .unwrap();

    assert_eq!(matched, 2);
    assert_eq!(users.count(doc! { "role": "admin" }).await.unwrap(), 2);
}

#[tokio::test]
async fn upsert_creates_then_replaces() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let id = ObjectId::new().to_hex();
    let mut record = user("a@b.com", "A");
    record.insert("id", id.as_str());

    users.upsert(record.clone(), &[]).await.unwrap();
    record.insert("first_name", "Z");
    let replaced = users.upsert(record, &[]).await.unwrap();

    assert_eq!(replaced.get_str("id").unwrap(), id);
    assert_eq!(users.count(doc! {}).await.unwrap(), 1);
    let found = users.find(&id, &[]).await.unwrap().unwrap();
    assert_eq!(found.get_str("first_name").unwrap(), "Z");
}

#[tokio::test]
async fn repeated_upsert_keeps_creation_date() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let mut seed = user("a@b.com", "A");
    seed.insert("id", ObjectId::new().to_hex());

    let first = users.upsert(seed.clone(), &[]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = users.upsert(seed, &[]).await.unwrap();

    let id = first.get_str("id").unwrap();
    let found = users.find(id, &[]).await.unwrap().unwrap();
    assert_eq!(
        found.get_str("created_date").unwrap(),
        first.get_str("created_date").unwrap()
    );
    assert_eq!(
        second.get_str("created_date").unwrap(),
        first.get_str("created_date").unwrap()
    );
    assert!(found.get_str("updated_date").unwrap() > first.get_str("updated_date").unwrap());
}

#[tokio::test]
async fn upsert_with_explicit_creation_date_uses_it() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let mut seed = user("a@b.com", "A");
    seed.insert("id", ObjectId::new().to_hex());
    users.upsert(seed.clone(), &[]).await.unwrap();

    seed.insert("created_date", "2000-01-01T00:00:00.000Z");
    let replaced = users.upsert(seed, &[]).await.unwrap();

    assert_eq!(replaced.get_str("created_date").unwrap(), "2000-01-01T00:00:00.000Z");
}

#[tokio::test]
async fn delete_by_ids_is_idempotent() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let inserted = users.insert(user("a@b.com", "A"), &[]).await.unwrap();
    let id = inserted.get_str("id").unwrap().to_string();

    assert_eq!(users.delete_by_id(&id).await.unwrap(), id);
    assert_eq!(users.delete_by_ids(vec![id.clone()]).await.unwrap(), vec![id]);
    assert_eq!(users.count(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_by_filter_refuses_empty_criteria() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    users
        .insert_many(vec![user("a@b.com", "A"), user("c@d.com", "C")], &[])
        .await
        .unwrap();

    assert_eq!(users.delete_by_filter(doc! {}).await.unwrap(), 0);
    assert_eq!(users.count(doc! {}).await.unwrap(), 2);

    assert_eq!(users.delete_by_filter(doc! { "first_name": "A" }).await.unwrap(), 1);
    assert_eq!(users.count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_by_filter_rejects_empty_combinators() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    users
        .insert_many(vec![user("a@b.com", "A"), user("c@d.com", "C")], &[])
        .await
        .unwrap();

    assert!(matches!(
        users.delete_by_filter(doc! { "$and": [] }).await,
        Err(TableLayerError::InvalidDocument(_))
    ));
    assert!(matches!(
        users.delete_by_filter(doc! { "$or": [] }).await,
        Err(TableLayerError::InvalidDocument(_))
    ));
    assert_eq!(users.count(doc! {}).await.unwrap(), 2);
}

#[tokio::test]
async fn zero_sized_page_is_empty_but_counted() {
    let engine = engine().await;
    let categories = engine.table("category").unwrap();
    let names = (0..3).map(|n| doc! { "name": format!("c{}", n) }).collect();
    categories.insert_many(names, &[]).await.unwrap();

    let filtered = categories
        .filter(doc! {}, FilterOptions::new().paginate(1, 0))
        .await
        .unwrap();

    let page = filtered.as_page().unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.count, 3);
    assert_eq!(page.next_page, None);
}

#[tokio::test]
async fn pages_count_the_full_criteria() {
    let engine = engine().await;
    let categories = engine.table("category").unwrap();
    let names = (0..25).map(|n| doc! { "name": format!("c{:02}", n) }).collect();
    categories.insert_many(names, &[]).await.unwrap();

    let options = || FilterOptions::new().sort("name", SortDirection::Asc);

    let first = categories.filter(doc! {}, options().paginate(0, 10)).await.unwrap();
    let page = first.as_page().unwrap();
    assert_eq!(page.data.len(), 10);
    assert_eq!(page.count, 25);
    assert_eq!(page.next_page, Some(1));
    assert_eq!(page.previous_page, None);
    assert_eq!(page.data[0].get_str("name").unwrap(), "c00");

    let last = categories.filter(doc! {}, options().paginate(2, 10)).await.unwrap();
    let page = last.as_page().unwrap();
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.next_page, None);
    assert_eq!(page.previous_page, Some(1));
    assert_eq!(page.data[0].get_str("name").unwrap(), "c20");

    let all = categories.filter(doc! {}, options()).await.unwrap();
    assert!(all.as_page().is_none());
    assert_eq!(all.records().len(), 25);
}

#[tokio::test]
async fn birth_dates_sort_in_reverse() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    let mut older = user("a@b.com", "Older");
    older.insert("dob", "1980-01-01T00:00:00.000Z");
    let mut younger = user("c@d.com", "Younger");
    younger.insert("dob", "2000-01-01T00:00:00.000Z");
    users.insert_many(vec![older, younger], &[]).await.unwrap();

    let sorted = users
        .filter(doc! {}, FilterOptions::new().sort("dob", SortDirection::Asc))
        .await
        .unwrap()
        .into_records();

    assert_eq!(sorted[0].get_str("first_name").unwrap(), "Younger");
    assert_eq!(sorted[1].get_str("first_name").unwrap(), "Older");
}

#[tokio::test]
async fn search_combines_with_criteria() {
    let engine = engine().await;
    let categories = engine.table("category").unwrap();
    let owner = ObjectId::new().to_hex();
    categories
        .insert_many(
            vec![
                doc! { "name": "Science Fiction", "owner_id": owner.as_str() },
                doc! { "name": "Fiction Classics" },
                doc! { "name": "Cooking", "owner_id": owner.as_str() },
            ],
            &[],
        )
        .await
        .unwrap();

    let found = categories
        .filter(doc! { "owner_id": owner.as_str() }, FilterOptions::new().search("fiction"))
        .await
        .unwrap()
        .into_records();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("name").unwrap(), "Science Fiction");
    assert_eq!(found[0].get_str("owner_id").unwrap(), owner);
}

#[tokio::test]
async fn unique_index_rejects_duplicates() {
    let engine = engine().await;
    let users = engine.table("user").unwrap();
    users.insert(user("a@b.com", "A"), &[]).await.unwrap();

    let err = users.insert(user("a@b.com", "B"), &[]).await.unwrap_err();

    assert!(matches!(err, TableLayerError::Backend(_)));
    assert!(!err.is_caller_error());
    assert_eq!(users.count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn undeclared_tables_are_rejected() {
    let engine = engine().await;

    assert!(matches!(
        engine.table("invoice"),
        Err(TableLayerError::UnknownTable(name)) if name == "invoice"
    ));
}

#[tokio::test]
async fn typed_rows_round_trip_through_records() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Category {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        status: Option<String>,
    }

    let engine = engine().await;
    let categories = engine.table("category").unwrap();
    let record = Category { id: None, name: "Books".into(), status: None }
        .to_record()
        .unwrap();

    let stored = Category::from_record(categories.insert(record, &[]).await.unwrap()).unwrap();

    assert!(stored.id.is_some());
    assert_eq!(stored.name, "Books");
    assert_eq!(stored.status.as_deref(), Some("active"));
}
