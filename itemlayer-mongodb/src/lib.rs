//! MongoDB backend implementation for itemlayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters are translated into MongoDB query documents and evaluated by the server, and
//! `find` hands out the driver cursor itself, so results arrive in batches.
//!
//! To use this backend, enable the `mongodb` feature of the facade crate:
//!
//! ```toml
//! [dependencies]
//! itemlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data lives in a MongoDB deployment
//! - **Server-side filtering** - The filter AST becomes a native query document
//! - **Batched cursors** - Result sets are streamed, never materialized by the adapter
//! - **Indexing** - Plain and unique indexes, with duplicate keys surfaced as constraint violations
//!
//! # Example
//!
//! ```ignore
//! use itemlayer_core::store::DocumentStore;
//! use itemlayer_mongodb::MongoDbStore;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = MongoDbStore::builder("mongodb://localhost:27017", "shop")
//!         .server_selection_timeout(Duration::from_secs(5));
//!     let store = DocumentStore::open(builder).await?;
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as itemlayer_mongodb;

mod error;
mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
