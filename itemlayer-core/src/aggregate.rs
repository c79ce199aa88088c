//! Summary statistics over a numeric field.
//!
//! Aggregation reads are not transactionally consistent with concurrent writes: the
//! count is whatever the store observed when it ran the aggregation.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use crate::{
    backend::{FieldSummary, StoreBackend},
    document::Document,
    error::{DocumentStoreResult, Problem, ValidationError},
    schema::FieldKind,
};

/// Count, average, min and max of one numeric field.
///
/// An empty collection yields all zeros instead of missing values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Number of documents in the collection.
    pub count: u64,
    /// Mean value.
    pub average: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl From<FieldSummary> for FieldStats {
    fn from(summary: FieldSummary) -> Self {
        if summary.count == 0 {
            return FieldStats::default();
        }

        FieldStats {
            count: summary.count,
            average: summary.average.unwrap_or_default(),
            min: summary.min.unwrap_or_default(),
            max: summary.max.unwrap_or_default(),
        }
    }
}

/// Aggregation access to the collection of `D`.
#[derive(Debug)]
pub struct Aggregation<'a, B: StoreBackend + ?Sized, D: Document> {
    backend: &'a B,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend + ?Sized, D: Document> Aggregation<'a, B, D> {
    pub(crate) fn new(backend: &'a B) -> Self {
        Self { backend, _marker: PhantomData }
    }

    /// Computes statistics over `field`, which must be a number field of the schema.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown or non-numeric fields.
    pub async fn summarize(&self, field: &str) -> DocumentStoreResult<FieldStats> {
        match D::schema().field(field) {
            Some(def) if def.kind == FieldKind::Number => {}
            Some(_) => return Err(ValidationError::single(field, Problem::WrongType).into()),
            None => return Err(ValidationError::single(field, Problem::Unknown).into()),
        }

        let summary = self
            .backend
            .summarize(D::collection_name(), field)
            .await?;

        tracing::debug!(collection = D::collection_name(), field, count = summary.count, "summarized field");

        Ok(summary.into())
    }
}
