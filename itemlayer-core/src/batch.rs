//! Multi-document inserts, updates and deletes.
//!
//! # Semantics
//!
//! - **Insert** is fail-fast on validation: every body is checked before the store is
//!   touched, and a single invalid body rejects the whole batch. Store-level failures are
//!   best effort: the insert is ordered, stops at the first rejected document and reports
//!   exactly the documents the store confirmed together with that first error.
//! - **Update** and **delete** are filter-driven. Zero matches is a normal outcome with
//!   zero counts. Matched documents are mutated independently, so a concurrent reader can
//!   observe some of them updated and others not yet.

use serde_json::Value;
use std::marker::PhantomData;

use crate::{
    backend::{DeleteManyResult, StoreBackend, UpdateManyResult, UpdateSpec},
    document::{Document, DocumentExt, FromStored, Record},
    error::{DocumentStoreError, DocumentStoreResult},
    query::Expr,
};

/// The document that stopped a batch insert and why.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the rejected document in the input.
    pub index: usize,
    /// The store error for that document.
    pub error: DocumentStoreError,
}

/// Outcome of a batch insert that reached the store.
#[derive(Debug)]
pub struct InsertManyResult<D> {
    /// Every document the store confirmed as persisted, in input order.
    pub inserted: Vec<Record<D>>,
    /// The first store-level failure, if the batch stopped early.
    pub failure: Option<BatchFailure>,
}

impl<D> InsertManyResult<D> {
    /// Number of persisted documents.
    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }

    /// Returns `true` if every input document was persisted.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Converts a partial outcome into its first error, discarding the confirmed documents.
    pub fn into_result(self) -> DocumentStoreResult<Vec<Record<D>>> {
        match self.failure {
            Some(failure) => Err(failure.error),
            None => Ok(self.inserted),
        }
    }
}

impl<D> Default for InsertManyResult<D> {
    fn default() -> Self {
        Self { inserted: Vec::new(), failure: None }
    }
}

/// Applies batch semantics on top of a backend for one collection.
#[derive(Debug)]
pub(crate) struct BatchCoordinator<'a, B: StoreBackend + ?Sized, D: Document> {
    collection: &'a str,
    backend: &'a B,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend + ?Sized, D: Document> BatchCoordinator<'a, B, D> {
    pub(crate) fn new(collection: &'a str, backend: &'a B) -> Self {
        Self { collection, backend, _marker: PhantomData }
    }

    pub(crate) async fn insert_many(&self, bodies: &[Value]) -> DocumentStoreResult<InsertManyResult<D>> {
        let schema = D::schema();

        let documents = bodies
            .iter()
            .enumerate()
            .map(|(index, body)| {
                let validated = schema
                    .validate_document(body)
                    .map_err(|err| err.at_index(index))?;

                D::from_body(validated)?.to_body()
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        if documents.is_empty() {
            return Ok(InsertManyResult::default());
        }

        let requested = documents.len();
        let outcome = self
            .backend
            .insert_many(self.collection, documents)
            .await?;

        let inserted = outcome
            .inserted
            .into_iter()
            .map(Record::<D>::from_stored)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let failure = outcome
            .failure
            .map(|(index, error)| BatchFailure { index, error });

        match &failure {
            Some(failure) => tracing::warn!(
                collection = self.collection,
                requested,
                inserted = inserted.len(),
                index = failure.index,
                error = %failure.error,
                "batch insert stopped early",
            ),
            None => tracing::debug!(collection = self.collection, inserted = inserted.len(), "batch insert"),
        }

        Ok(InsertManyResult { inserted, failure })
    }

    pub(crate) async fn update_many(
        &self,
        filter: Option<Expr>,
        update: UpdateSpec,
    ) -> DocumentStoreResult<UpdateManyResult> {
        let result = self
            .backend
            .update_many(self.collection, filter, update)
            .await?;

        tracing::debug!(
            collection = self.collection,
            matched = result.matched_count,
            modified = result.modified_count,
            "batch update",
        );

        Ok(result)
    }

    pub(crate) async fn delete_many(&self, filter: Option<Expr>) -> DocumentStoreResult<DeleteManyResult> {
        let result = self
            .backend
            .delete_many(self.collection, filter)
            .await?;

        tracing::debug!(collection = self.collection, deleted = result.deleted_count, "batch delete");

        Ok(result)
    }
}
