//! Main itemlayer crate: a typed CRUD resource layer over document collections.
//!
//! This crate is the primary entry point. It re-exports the core types, gives access to
//! the storage backends, and owns the `Item` entity together with the contract expected
//! by the transport layer.
//!
//! # Features
//!
//! - **Validated CRUD** - Schema-less request bodies are checked against a field allow-list
//!   before any store call
//! - **Batch semantics** - Fail-fast validation, exact partial-failure reports, filter-driven
//!   bulk updates and deletes
//! - **Aggregation** - Count, average, min and max of a numeric field, zeros when empty
//! - **Lazy listing** - Chunked cursors released on exhaustion, error, close or drop
//! - **Multiple backends** - In-memory and MongoDB (`mongodb` feature) behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use itemlayer::{prelude::*, config::StoreConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     itemlayer::telemetry::init();
//!
//!     let store = connect(&StoreConfig::from_env()?).await?;
//!     let items = store.repository::<Item>();
//!
//!     let lamp = items.create(json!({ "name": "Lamp", "price": 25 })).await?;
//!     items.update(&lamp.id, json!({ "price": 30 })).await?;
//!
//!     let stats = ItemStats::compute(&store).await?;
//!     println!("{}", serde_json::to_string(&stats)?);
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! [`config::connect`] returns a `DocumentStore<dyn StoreBackend>` so the backend can be
//! picked at runtime. A statically typed store converts with `into_dyn`:
//!
//! ```ignore
//! use itemlayer::{prelude::*, memory::InMemoryStore};
//!
//! let store = DocumentStore::open(InMemoryStore::builder()).await?.into_dyn();
//! ```

#[allow(unused_extern_crates)]
extern crate self as itemlayer;

pub mod config;
pub mod contract;
pub mod item;
pub mod prelude;
pub mod telemetry;

pub use itemlayer_core::{aggregate, backend, batch, cursor, document, error, query, repository, schema, store};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use itemlayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use itemlayer_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
