//! Error types and result types for resource operations.
//!
//! Every repository, batch and aggregation call returns either a success value or one
//! of the variants of [`DocumentStoreError`]. Backends translate their native failures
//! into this taxonomy at their boundary, so no driver error type ever reaches a caller.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use std::fmt;

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The input document is malformed or incomplete. Always raised before any store call.
    #[error("Validation error: {0}")]
    Validation(ValidationError),
    /// A single-document result was required but nothing matched.
    #[error("Document {id} not found in collection {collection}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// The id that did not match.
        id: String,
    },
    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// The store did not answer in time.
    #[error("Store timeout: {0}")]
    Timeout(String),
    /// A store constraint rejected the write, e.g. a duplicate unique key.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Any other failure reported by the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl DocumentStoreError {
    /// Builds a [`DocumentStoreError::NotFound`] for the given collection and id.
    pub fn not_found(collection: impl Into<String>, id: impl fmt::Display) -> Self {
        DocumentStoreError::NotFound {
            collection: collection.into(),
            id: id.to_string(),
        }
    }

    /// Returns `true` for connectivity and latency failures.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::Unavailable(_) | DocumentStoreError::Timeout(_)
        )
    }
}

impl From<ValidationError> for DocumentStoreError {
    fn from(err: ValidationError) -> Self {
        DocumentStoreError::Validation(err)
    }
}

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

/// What is wrong with a single field of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    /// The input is not a JSON object.
    NotAnObject,
    /// A required field is absent.
    Missing,
    /// The field is not part of the schema.
    Unknown,
    /// A required field is `null`.
    Null,
    /// The field holds a value of the wrong kind.
    WrongType,
    /// A text field that must not be empty is empty.
    Empty,
    /// The filter uses an operator outside the allow-list.
    UnsupportedOperator,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Problem::NotAnObject => "expected an object",
            Problem::Missing => "is required",
            Problem::Unknown => "is not an allowed field",
            Problem::Null => "must not be null",
            Problem::WrongType => "has the wrong type",
            Problem::Empty => "must not be empty",
            Problem::UnsupportedOperator => "uses an unsupported operator",
        })
    }
}

/// A problem attached to a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Field name, or an empty string for the document itself.
    pub field: String,
    /// The problem found.
    pub problem: Problem,
}

impl FieldIssue {
    /// Creates a new issue.
    pub fn new(field: impl Into<String>, problem: Problem) -> Self {
        Self { field: field.into(), problem }
    }
}

/// Shape violation in an input document.
///
/// In batch contexts `index` is the position of the first offending document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationError {
    /// Position in the batch, if the document was part of one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// All issues found in the document.
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Creates an error holding a single issue.
    pub fn single(field: impl Into<String>, problem: Problem) -> Self {
        Self {
            index: None,
            issues: vec![FieldIssue::new(field, problem)],
        }
    }

    /// Attaches the position of the document inside a batch.
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub(crate) fn push(&mut self, field: impl Into<String>, problem: Problem) {
        self.issues.push(FieldIssue::new(field, problem));
    }

    pub(crate) fn into_result(self) -> Result<(), ValidationError> {
        if self.issues.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.index {
            write!(f, "document {index}: ")?;
        }

        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            if issue.field.is_empty() {
                write!(f, "{}", issue.problem)?;
            } else {
                write!(f, "`{}` {}", issue.field, issue.problem)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_issue() {
        let mut err = ValidationError::default();
        err.push("name", Problem::Empty);
        err.push("colour", Problem::Unknown);

        assert_eq!(
            err.clone().at_index(2).to_string(),
            "document 2: `name` must not be empty; `colour` is not an allowed field"
        );
        assert_eq!(
            DocumentStoreError::from(err).to_string(),
            "Validation error: `name` must not be empty; `colour` is not an allowed field"
        );
    }

    #[test]
    fn store_failures_are_classified() {
        assert!(DocumentStoreError::Timeout("slow".into()).is_store_failure());
        assert!(DocumentStoreError::Unavailable("down".into()).is_store_failure());
        assert!(!DocumentStoreError::not_found("items", "42").is_store_failure());
    }
}
