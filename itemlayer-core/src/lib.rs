//! A typed CRUD resource layer over JSON document collections.
//!
//! This crate is the core of the itemlayer project and provides:
//!
//! - **Document traits** ([`document`]) - Typed bodies, ids and records
//! - **Schemas** ([`schema`]) - Field allow-lists and validation of untyped input
//! - **Store backend abstraction** ([`backend`]) - The adapter trait implemented per store
//! - **Filtering API** ([`query`]) - Typed filters, projections and a safe JSON filter parser
//! - **Repositories** ([`repository`]) - Validated CRUD over one collection
//! - **Batch operations** ([`batch`]) - Multi-document insert, update and delete semantics
//! - **Aggregation** ([`aggregate`]) - Summary statistics over numeric fields
//! - **Cursors** ([`cursor`]) - Lazy, one-shot record sequences
//! - **Document store** ([`store`]) - The process-wide backend handle
//! - **Error handling** ([`error`]) - The typed error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use itemlayer_core::{document::Document, schema::{FieldDef, Schema}};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Item {
//!     pub name: String,
//!     pub price: f64,
//! }
//!
//! static ITEM_SCHEMA: Schema = Schema::new(&[
//!     FieldDef::text("name").required().non_empty(),
//!     FieldDef::number("price").required(),
//! ]);
//!
//! impl Document for Item {
//!     fn collection_name() -> &'static str { "items" }
//!     fn schema() -> &'static Schema { &ITEM_SCHEMA }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as itemlayer_core;

pub mod aggregate;
pub mod backend;
pub mod batch;
pub mod cursor;
pub mod document;
pub mod error;
pub mod query;
pub mod repository;
pub mod schema;
pub mod store;
