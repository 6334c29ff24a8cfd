//! MongoDB backend implementation for tablelayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait,
//! translating criteria into MongoDB filters and table index declarations into
//! named MongoDB indexes.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tablelayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Full query support** - Filtering, multi-key sorting, projection and `$text` search
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//! - **Indexing** - Named, unique and text indexes, as used by reconciliation
//!
//! # Connection
//!
//! A MongoDB connection string and database name are given to the builder
//! directly, or read from `TABLELAYER_MONGODB_URI` and
//! `TABLELAYER_MONGODB_DATABASE` with [`MongoDbStoreBuilder::from_env`].
//!
//! # Example
//!
//! ```ignore
//! use tablelayer::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as tablelayer_mongodb;

pub mod store;
pub(crate) mod query;
pub(crate) mod sanitizer;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
