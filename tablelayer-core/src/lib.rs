//! A schema-driven access layer over schemaless document databases.
//!
//! This crate is the core of the tablelayer project and provides:
//!
//! - **Table definitions** ([`schema`]) - JSON-Schema-shaped declarations of tables and indexes
//! - **Schema registry** ([`registry`]) - The immutable set of declared tables
//! - **Identifier/type codec** ([`codec`]) - String ⇄ native identifiers, date normalization
//! - **Validation** ([`validator`]) - Per-operation record validation
//! - **Query and filtering API** ([`query`]) - Criteria parsing and the backend-neutral expression tree
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Query engine** ([`engine`], [`table`]) - Generic CRUD, filter and pagination per table
//! - **Reconciliation** ([`reconcile`]) - Converging live collections and indexes to the registry
//! - **Call tracing** ([`trace`]) - A logging decorator for any backend
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use tablelayer_core::{engine::QueryEngine, registry::SchemaRegistry, schema::{Property, TableDefinition}};
//! use bson::doc;
//!
//! let registry = SchemaRegistry::new([
//!     TableDefinition::builder("category")
//!         .required(["name"])
//!         .property("name", Property::string())
//!         .build(),
//! ])?;
//!
//! let engine = QueryEngine::new(backend, registry);
//! engine.reconciler().reconcile().await?;
//!
//! let books = engine.table("category")?.insert(doc! { "name": "Books" }, &[]).await?;
//! assert_eq!(books.get_str("status")?, "active");
//! ```

#[allow(unused_extern_crates)]
extern crate self as tablelayer_core;

pub mod backend;
pub mod codec;
pub mod engine;
pub mod error;
pub mod page;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod schema;
pub mod table;
pub mod trace;
pub mod validator;
