//! In-memory document storage backend for itemlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development,
//! tests and small deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Chunked cursors** - `find` streams documents chunk by chunk in insertion order
//! - **Full filter support** - Every operator of the filter AST is evaluated in process
//! - **Unique indexes** - `ensure_index(.., true)` rejects duplicate values
//!
//! # Quick Start
//!
//! ```ignore
//! use itemlayer_core::store::DocumentStore;
//! use itemlayer_memory::InMemoryStore;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::open(InMemoryStore::builder()).await?;
//!     let items = store.repository::<Item>();
//!
//!     items.create(json!({ "name": "Lamp", "price": 25 })).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as itemlayer_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
