//! In-memory storage backend for tablelayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Full query support** - Filtering, multi-key sorting, projection and pagination
//! - **Index bookkeeping** - Named indexes per collection, unique constraints and text search
//!
//! # Quick Start
//!
//! ```ignore
//! use tablelayer::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = QueryEngine::new(InMemoryStore::builder().build().await?, registry);
//!     engine.reconciler().reconcile().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as tablelayer_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
