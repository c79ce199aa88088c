//! Convenient re-exports of commonly used types from itemlayer.
//!
//! ```ignore
//! use itemlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Document traits, ids and records
//! - Store backends and builders
//! - Filters and projections
//! - Repositories, batch results and aggregation
//! - Error types and the `Item` entity

pub use itemlayer_core::{
    aggregate::{Aggregation, FieldStats},
    backend::{DeleteManyResult, StoreBackend, StoreBackendBuilder, UpdateManyResult},
    batch::{BatchFailure, InsertManyResult},
    cursor::RecordStream,
    document::{Document, DocumentExt, DocumentId, PartialRecord, Record},
    error::{DocumentStoreError, DocumentStoreResult, FieldIssue, Problem, ValidationError},
    query::{Expr, FieldOp, Filter, Projection, parse_filter},
    repository::Repository,
    schema::{FieldDef, FieldKind, Schema},
    store::DocumentStore,
};

pub use crate::{
    config::{StoreConfig, connect},
    item::{Item, ItemStats},
};
