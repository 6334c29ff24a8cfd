//! Main tablelayer crate providing schema-driven table access over document databases.
//!
//! This crate is the primary entry point for users of the tablelayer framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the different storage backends.
//!
//! # Features
//!
//! - **Declared tables** - JSON-Schema-shaped table definitions held in one immutable registry
//! - **Generic CRUD** - One engine serves every declared table: find, filter, count, insert,
//!   upsert, update and delete, with validation on every write
//! - **String identifiers** - Callers always see string `id`s; the store keeps native ids
//! - **Pagination and search** - Zero-indexed pages with total counts, full-text search
//! - **Reconciliation** - Converge live collections and indexes to the registry
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use tablelayer::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SchemaRegistry::new([
//!         TableDefinition::builder("category")
//!             .required(["name"])
//!             .property("name", Property::string())
//!             .index(IndexDeclaration::builder("name_text").text("name").build())
//!             .build(),
//!     ])?;
//!
//!     let engine = QueryEngine::new(InMemoryStore::new(), registry);
//!     engine.reconciler().reconcile().await?;
//!
//!     let categories = engine.table("category")?;
//!     let books = categories.insert(doc! { "name": "Books" }, &[]).await?;
//!
//!     let found = categories.find(books.get_str("id")?, &["name"]).await?;
//!     println!("Found: {:?}", found);
//!
//!     let page = categories
//!         .filter(doc! {}, FilterOptions::new().search("books").paginate(0, 10))
//!         .await?;
//!     println!("Matched {} categories", page.records().len());
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Reconciliation
//!
//! The registry is the source of truth for which collections and indexes exist.
//! Reconciling creates what is declared and missing, and drops what is live and
//! undeclared (the primary index excepted). Use [`reconcile::Reconciler::plan`]
//! first against a store holding data you care about.
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use tablelayer_core::{
    backend, codec, engine, error, page, query, reconcile, record, registry, schema, table, trace,
    validator,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use tablelayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use tablelayer_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
