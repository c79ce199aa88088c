//! Storage backend abstraction for the document store.
//!
//! This module defines the adapter trait that translates generic document operations
//! into store-native calls. A backend owns one long-lived connection, exposes the
//! primitives used by the repository, batch and aggregation layers, and translates every
//! native failure into [`DocumentStoreError`](crate::error::DocumentStoreError).
//!
//! # Overview
//!
//! - [`StoreBackend`]: the async, object-safe adapter trait
//! - [`StoreBackendBuilder`]: factory trait for creating backend instances
//! - [`DocumentStream`]: the lazy result sequence returned by [`StoreBackend::find`]
//!
//! # Cursors
//!
//! `find` never materializes the full result set. The returned stream pulls documents
//! from the store in chunks of [`FindOptions::batch_size`], and dropping it releases the
//! store-side cursor. Native cursor types never cross this boundary.
//!
//! # Atomicity
//!
//! Single-document operations (`update_by_id`, `replace_by_id`, `delete_by_id`) must be
//! atomic: a concurrent reader observes the pre- or the post-image, never a mix.
//! Multi-document operations (`update_many`, `delete_many`) are applied document by
//! document and are not atomic across the matched set.

use async_trait::async_trait;
use bson::Document as BsonDocument;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::{
    document::{DocumentId, StoredDocument},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Projection},
};

/// Default number of documents pulled from a cursor per round trip.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// A lazy, one-shot sequence of stored documents.
pub type DocumentStream = BoxStream<'static, DocumentStoreResult<StoredDocument>>;

/// Options for [`StoreBackend::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Documents must match this filter. `None` matches everything.
    pub filter: Option<Expr>,
    /// Keep only these fields of each body. The id is always kept.
    pub projection: Option<Projection>,
    /// Chunk size for cursor round trips. `None` uses the backend default.
    pub batch_size: Option<u32>,
}

impl FindOptions {
    /// Options matching every document of a collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the result to documents matching `filter`.
    pub fn with_filter(mut self, filter: Option<Expr>) -> Self {
        self.filter = filter;
        self
    }

    /// Restricts the returned fields.
    pub fn with_projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection;
        self
    }

    /// Overrides the cursor chunk size.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }
}

/// A field-level merge: fields to set and fields to remove.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    /// Fields to overwrite or add.
    pub set: BsonDocument,
    /// Fields to remove.
    pub unset: Vec<String>,
}

impl UpdateSpec {
    /// Returns `true` if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Applies the update to a body in place. Returns `true` if the body changed.
    pub fn apply_to(&self, body: &mut BsonDocument) -> bool {
        let mut changed = false;

        for (key, value) in &self.set {
            if body.get(key) != Some(value) {
                body.insert(key.clone(), value.clone());
                changed = true;
            }
        }

        for key in &self.unset {
            changed |= body.remove(key).is_some();
        }

        changed
    }
}

/// Result of an ordered multi-document insert.
#[derive(Debug)]
pub struct InsertManyOutcome {
    /// Documents the store confirmed as persisted, in input order.
    pub inserted: Vec<StoredDocument>,
    /// Index and error of the first document the store rejected, if any.
    pub failure: Option<(usize, DocumentStoreError)>,
}

/// Counts reported by a filter-driven update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManyResult {
    /// Documents that matched the filter.
    pub matched_count: u64,
    /// Documents whose body actually changed.
    pub modified_count: u64,
}

/// Count reported by a filter-driven delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteManyResult {
    /// Documents removed.
    pub deleted_count: u64,
}

/// Raw statistics of one numeric field across a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldSummary {
    /// Number of documents in the collection.
    pub count: u64,
    /// Mean of the numeric values, `None` if there are none.
    pub average: Option<f64>,
    /// Smallest numeric value.
    pub min: Option<f64>,
    /// Largest numeric value.
    pub max: Option<f64>,
}

/// Abstract interface for document storage backends.
///
/// Implementations must be thread-safe and support concurrent access from multiple async
/// tasks. The trait is object safe, so `dyn StoreBackend` can be selected at runtime.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Streams the documents of `collection` matching `options`.
    async fn find(&self, collection: &str, options: FindOptions) -> DocumentStoreResult<DocumentStream>;

    /// Fetches one document. Unknown or malformed ids return `Ok(None)`.
    async fn find_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> DocumentStoreResult<Option<StoredDocument>>;

    /// Inserts one document under a freshly assigned id.
    async fn insert_one(
        &self,
        collection: &str,
        body: BsonDocument,
    ) -> DocumentStoreResult<StoredDocument>;

    /// Inserts documents in order, stopping at the first store-level failure.
    ///
    /// An `Err` means nothing was confirmed as persisted.
    async fn insert_many(
        &self,
        collection: &str,
        bodies: Vec<BsonDocument>,
    ) -> DocumentStoreResult<InsertManyOutcome>;

    /// Atomically merges `update` into one document and returns the post-image.
    async fn update_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
        update: UpdateSpec,
    ) -> DocumentStoreResult<Option<StoredDocument>>;

    /// Applies `update` to every document matching `filter`, one document at a time.
    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: UpdateSpec,
    ) -> DocumentStoreResult<UpdateManyResult>;

    /// Atomically replaces the body of one document and returns the post-image.
    async fn replace_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
        body: BsonDocument,
    ) -> DocumentStoreResult<Option<StoredDocument>>;

    /// Atomically removes one document and returns the pre-image.
    async fn delete_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> DocumentStoreResult<Option<StoredDocument>>;

    /// Removes every document matching `filter`.
    async fn delete_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
    ) -> DocumentStoreResult<DeleteManyResult>;

    /// Computes count, average, min and max of a numeric field.
    async fn summarize(&self, collection: &str, field: &str) -> DocumentStoreResult<FieldSummary>;

    /// Creates an index on `field`, enforcing uniqueness when `unique` is set.
    async fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    /// Releases the connection. The backend must not be used afterwards.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// Factory trait for creating [`StoreBackend`] instances.
#[async_trait]
pub trait StoreBackendBuilder {
    /// The type of backend this builder creates.
    type Backend: StoreBackend;

    /// Builds and initializes a new backend instance.
    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
