//! Typed CRUD over a single collection.
//!
//! A [`Repository`] is the only way callers touch documents. Every mutation validates its
//! input against [`Document::schema`](crate::document::Document::schema) before the store
//! is called, and every result is either a typed value or a
//! [`DocumentStoreError`](crate::error::DocumentStoreError). Absent documents are reported
//! as `Ok(None)`, never as errors.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//!
//! let items = store.repository::<Item>();
//! let created = items.create(json!({ "name": "Lamp", "price": 25 })).await?;
//! let fetched = items.get(&created.id).await?;
//! assert_eq!(fetched, Some(created));
//! ```

use serde_json::Value;
use std::marker::PhantomData;

use crate::{
    backend::{DeleteManyResult, FindOptions, StoreBackend, UpdateManyResult},
    batch::{BatchCoordinator, InsertManyResult},
    cursor::RecordStream,
    document::{Document, DocumentExt, DocumentId, FromStored, PartialRecord, Record},
    error::DocumentStoreResult,
    query::{Expr, Projection},
};

/// Typed CRUD access to the collection of `D`.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type, possibly `dyn StoreBackend`
/// * `D` - The document type
#[derive(Debug)]
pub struct Repository<'a, B: StoreBackend + ?Sized, D: Document> {
    name: &'static str,
    backend: &'a B,
    batch_size: Option<u32>,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend + ?Sized, D: Document> Repository<'a, B, D> {
    pub(crate) fn new(backend: &'a B, batch_size: Option<u32>) -> Self {
        Self {
            name: D::collection_name(),
            backend,
            batch_size,
            _marker: PhantomData,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        self.name
    }

    fn batch(&self) -> BatchCoordinator<'_, B, D> {
        BatchCoordinator::new(self.name, self.backend)
    }

    fn find_options(&self, projection: Option<Projection>) -> FindOptions {
        let options = FindOptions::all().with_projection(projection);

        match self.batch_size {
            Some(size) => options.with_batch_size(size),
            None => options,
        }
    }

    /// Validates and persists a new document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Validation`](crate::error::DocumentStoreError::Validation)
    /// if the body does not match the schema. Nothing is written in that case.
    pub async fn create(&self, body: Value) -> DocumentStoreResult<Record<D>> {
        let validated = D::schema().validate_document(&body)?;
        let document = D::from_body(validated)?;

        let stored = self
            .backend
            .insert_one(self.name, document.to_body()?)
            .await?;

        tracing::debug!(collection = self.name, id = %stored.id, "created document");

        Record::from_stored(stored)
    }

    /// Validates and persists a typed document.
    pub async fn create_from(&self, document: &D) -> DocumentStoreResult<Record<D>> {
        self.create(document.to_json()?).await
    }

    /// Validates every body, then inserts them in one ordered batch.
    ///
    /// A validation failure in any body rejects the whole batch before the store is
    /// touched. A store failure part-way through is reported in
    /// [`InsertManyResult::failure`] next to the documents that were persisted.
    pub async fn create_many(&self, bodies: Vec<Value>) -> DocumentStoreResult<InsertManyResult<D>> {
        self.batch().insert_many(&bodies).await
    }

    /// Fetches a document by id.
    pub async fn get(&self, id: &DocumentId) -> DocumentStoreResult<Option<Record<D>>> {
        self.backend
            .find_by_id(self.name, id)
            .await?
            .map(Record::from_stored)
            .transpose()
    }

    /// Returns every document, optionally restricted to some fields.
    ///
    /// The id is part of every returned record whatever the projection.
    pub async fn list(&self, projection: Option<Projection>) -> DocumentStoreResult<Vec<PartialRecord>> {
        if let Some(projection) = &projection {
            projection.validate(D::schema())?;
        }

        self.open_stream(projection)
            .await?
            .collect_all()
            .await
    }

    /// Returns every document as a typed record.
    pub async fn list_all(&self) -> DocumentStoreResult<Vec<Record<D>>> {
        self.stream().await?.collect_all().await
    }

    /// Opens a lazy sequence over every document.
    ///
    /// Documents are pulled from the store in chunks as the stream is polled. Close or drop
    /// the stream to release the store cursor early.
    pub async fn stream(&self) -> DocumentStoreResult<RecordStream<Record<D>>> {
        self.open_stream(None).await
    }

    /// Opens a lazy sequence of projected records.
    pub async fn stream_projected(
        &self,
        projection: Projection,
    ) -> DocumentStoreResult<RecordStream<PartialRecord>> {
        projection.validate(D::schema())?;

        self.open_stream(Some(projection)).await
    }

    async fn open_stream<T: FromStored>(
        &self,
        projection: Option<Projection>,
    ) -> DocumentStoreResult<RecordStream<T>> {
        let inner = self
            .backend
            .find(self.name, self.find_options(projection))
            .await?;

        Ok(RecordStream::new(inner))
    }

    /// Merges `patch` into an existing document and returns the result.
    ///
    /// `id` keys in the patch are ignored. An empty patch returns the current document.
    pub async fn update(&self, id: &DocumentId, patch: Value) -> DocumentStoreResult<Option<Record<D>>> {
        let update = D::schema().validate_patch(&patch)?;

        if update.is_empty() {
            return self.get(id).await;
        }

        let updated = self
            .backend
            .update_by_id(self.name, id, update)
            .await?;

        tracing::debug!(collection = self.name, %id, found = updated.is_some(), "updated document");

        updated.map(Record::from_stored).transpose()
    }

    /// Applies `patch` to every document matching `filter`.
    ///
    /// Zero matches is not an error. The update is not atomic across matched documents.
    pub async fn update_many(&self, filter: Option<Expr>, patch: Value) -> DocumentStoreResult<UpdateManyResult> {
        let update = D::schema().validate_patch(&patch)?;

        self.batch().update_many(filter, update).await
    }

    /// Replaces the whole body of a document, keeping its id.
    pub async fn replace(&self, id: &DocumentId, body: Value) -> DocumentStoreResult<Option<Record<D>>> {
        let validated = D::schema().validate_document(&body)?;
        let document = D::from_body(validated)?;

        let replaced = self
            .backend
            .replace_by_id(self.name, id, document.to_body()?)
            .await?;

        tracing::debug!(collection = self.name, %id, found = replaced.is_some(), "replaced document");

        replaced.map(Record::from_stored).transpose()
    }

    /// Removes a document and returns it.
    pub async fn delete(&self, id: &DocumentId) -> DocumentStoreResult<Option<Record<D>>> {
        let deleted = self
            .backend
            .delete_by_id(self.name, id)
            .await?;

        tracing::debug!(collection = self.name, %id, found = deleted.is_some(), "deleted document");

        deleted.map(Record::from_stored).transpose()
    }

    /// Removes every document matching `filter`. `None` removes everything.
    pub async fn delete_many(&self, filter: Option<Expr>) -> DocumentStoreResult<DeleteManyResult> {
        self.batch().delete_many(filter).await
    }
}
