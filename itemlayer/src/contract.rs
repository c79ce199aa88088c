//! Request and response shapes exchanged with the transport layer.
//!
//! The routing layer itself lives outside this crate. What it needs from the core is
//! defined here as data: how each error becomes a status code and a payload, how the
//! bulk-update body is read, and what the default list projection is.
//!
//! Error payloads distinguish validation, absence and store failures without carrying
//! driver messages: store failures only expose their kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use itemlayer_core::{
    backend::{DeleteManyResult, UpdateManyResult},
    batch::InsertManyResult,
    document::Record,
    error::{DocumentStoreError, FieldIssue, ValidationError},
    query::{Expr, Projection, parse_filter},
    schema::{Schema, patch_fields},
};

/// Fields returned by a plain list request.
pub const DEFAULT_LIST_FIELDS: [&str; 2] = ["name", "description"];

/// Projection applied by a plain list request. The id is always returned as well.
pub fn default_list_projection() -> Projection {
    Projection::new(DEFAULT_LIST_FIELDS)
}

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request body or filter was rejected.
    Validation,
    /// No document has the requested id.
    NotFound,
    /// A unique constraint refused the write.
    ConstraintViolation,
    /// The store could not be reached.
    StoreUnavailable,
    /// The store did not answer in time.
    StoreTimeout,
    /// Any other failure.
    Internal,
}

impl ErrorKind {
    /// HTTP status code the transport answers with.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::ConstraintViolation => 409,
            ErrorKind::StoreUnavailable => 503,
            ErrorKind::StoreTimeout => 504,
            ErrorKind::Internal => 500,
        }
    }

    fn message(self) -> &'static str {
        match self {
            ErrorKind::Validation => "the request body is invalid",
            ErrorKind::NotFound => "no document has this id",
            ErrorKind::ConstraintViolation => "the write conflicts with an existing document",
            ErrorKind::StoreUnavailable => "the document store is unavailable",
            ErrorKind::StoreTimeout => "the document store did not answer in time",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl From<&DocumentStoreError> for ErrorKind {
    fn from(err: &DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::Validation(_) => ErrorKind::Validation,
            DocumentStoreError::NotFound { .. } => ErrorKind::NotFound,
            DocumentStoreError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            DocumentStoreError::Unavailable(_) => ErrorKind::StoreUnavailable,
            DocumentStoreError::Timeout(_) => ErrorKind::StoreTimeout,
            DocumentStoreError::Serialization(_)
            | DocumentStoreError::Initialization(_)
            | DocumentStoreError::Backend(_) => ErrorKind::Internal,
        }
    }
}

/// Structured error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Failure category.
    pub error: ErrorKind,
    /// Human-readable summary. Never contains driver output.
    pub message: String,
    /// Position of the offending document in a batch request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Field problems, for validation failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldIssue>,
}

impl ErrorPayload {
    /// HTTP status code of this payload.
    pub fn status(&self) -> u16 {
        self.error.status()
    }

    /// Payload for an id that matched nothing.
    pub fn not_found() -> Self {
        Self::bare(ErrorKind::NotFound)
    }

    fn bare(kind: ErrorKind) -> Self {
        Self { error: kind, message: kind.message().to_string(), index: None, issues: Vec::new() }
    }

    /// Attaches the batch position of the failing document.
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl From<&ValidationError> for ErrorPayload {
    fn from(err: &ValidationError) -> Self {
        Self {
            error: ErrorKind::Validation,
            message: err.to_string(),
            index: err.index,
            issues: err.issues.clone(),
        }
    }
}

impl From<&DocumentStoreError> for ErrorPayload {
    fn from(err: &DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::Validation(validation) => validation.into(),
            other => {
                let kind = ErrorKind::from(other);

                if kind == ErrorKind::Internal {
                    tracing::warn!(error = %other, "request failed");
                }

                Self::bare(kind)
            }
        }
    }
}

/// A response ready for the transport: a status code and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl Response {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status, body },
            Err(err) => Self::error(&err.into()),
        }
    }

    /// `200` with `body`.
    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self::json(200, body)
    }

    /// `201` with `body`.
    pub fn created<T: Serialize>(body: &T) -> Self {
        Self::json(201, body)
    }

    /// The error payload of `err` with its status code.
    pub fn error(err: &DocumentStoreError) -> Self {
        let payload = ErrorPayload::from(err);
        let status = payload.status();

        Self::json(status, &payload)
    }

    /// `200` for a present document, `404` for an absent one.
    pub fn found<T: Serialize>(result: &Option<T>) -> Self {
        match result {
            Some(body) => Self::ok(body),
            None => Self::json(404, &ErrorPayload::not_found()),
        }
    }

    /// Maps a repository result that expects a single document.
    pub fn from_lookup<T: Serialize>(result: &Result<Option<T>, DocumentStoreError>) -> Self {
        match result {
            Ok(found) => Self::found(found),
            Err(err) => Self::error(err),
        }
    }
}

/// Body of a bulk update: `{ "filter": {...}, "update": {...} }`.
///
/// `update` is either the plain fields to merge or a `{"$set": {...}}` wrapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateManyRequest {
    /// Filter selecting the documents, `{}` or absent for all of them.
    #[serde(default)]
    pub filter: Value,
    /// Fields to merge into each matched document.
    #[serde(default)]
    pub update: Value,
}

impl UpdateManyRequest {
    /// Parses the filter against the allow-list of `schema`.
    pub fn filter(&self, schema: &Schema) -> Result<Option<Expr>, ValidationError> {
        parse_filter(&self.filter, schema)
    }

    /// The fields to merge, with a `$set` wrapper removed.
    pub fn patch(&self) -> Value {
        match &self.update {
            Value::Null => Value::Object(Map::new()),
            update => patch_fields(update).clone(),
        }
    }
}

/// Body of a bulk delete: the filter itself.
pub fn delete_many_filter(body: &Value, schema: &Schema) -> Result<Option<Expr>, ValidationError> {
    parse_filter(body, schema)
}

/// Response body of a batch insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyResponse<D> {
    /// Documents persisted, in input order.
    pub inserted: Vec<Record<D>>,
    /// Length of `inserted`.
    pub inserted_count: usize,
    /// Failure that stopped the batch, with its index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl<D> From<InsertManyResult<D>> for InsertManyResponse<D> {
    fn from(result: InsertManyResult<D>) -> Self {
        let inserted_count = result.inserted_count();
        let error = result
            .failure
            .map(|failure| ErrorPayload::from(&failure.error).at_index(failure.index));

        Self { inserted: result.inserted, inserted_count, error }
    }
}

impl<D: Serialize> InsertManyResponse<D> {
    /// `201` when every document was persisted, otherwise the failure status with the
    /// confirmed documents still listed.
    pub fn into_response(self) -> Response {
        let status = self.error.as_ref().map_or(201, ErrorPayload::status);

        Response::json(status, &self)
    }
}

/// Counts of a bulk update, as returned to the caller.
pub fn update_many_response(result: &UpdateManyResult) -> Response {
    Response::ok(result)
}

/// Count of a bulk delete, as returned to the caller.
pub fn delete_many_response(result: &DeleteManyResult) -> Response {
    Response::ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemlayer_core::{batch::BatchFailure, error::Problem};
    use serde_json::json;

    use crate::item::{ITEM_SCHEMA, Item};

    #[test]
    fn status_codes_follow_the_error_kind() {
        let cases = [
            (DocumentStoreError::Validation(ValidationError::single("name", Problem::Empty)), 400),
            (DocumentStoreError::not_found("items", "x"), 404),
            (DocumentStoreError::ConstraintViolation("E11000 dup key: { name: \"A\" }".into()), 409),
            (DocumentStoreError::Unavailable("connection refused 10.0.0.3".into()), 503),
            (DocumentStoreError::Timeout("server selection".into()), 504),
            (DocumentStoreError::Backend("opaque".into()), 500),
        ];

        for (err, status) in cases {
            assert_eq!(Response::error(&err).status, status, "{err}");
        }
    }

    #[test]
    fn store_failures_do_not_leak_driver_messages() {
        let payload = ErrorPayload::from(&DocumentStoreError::Unavailable("connection refused 10.0.0.3:27017".into()));

        assert_eq!(payload.error, ErrorKind::StoreUnavailable);
        assert!(!payload.message.contains("10.0.0.3"));
    }

    #[test]
    fn validation_payloads_list_their_issues() {
        let err = ValidationError::single("name", Problem::Empty).at_index(1);
        let body = Response::error(&err.into()).body;

        assert_eq!(
            body,
            json!({
                "error": "validation",
                "message": "document 1: `name` must not be empty",
                "index": 1,
                "issues": [{ "field": "name", "problem": "empty" }],
            })
        );
    }

    #[test]
    fn absent_documents_are_404() {
        let absent: Result<Option<Item>, DocumentStoreError> = Ok(None);
        assert_eq!(Response::from_lookup(&absent).status, 404);

        let present: Result<Option<Item>, DocumentStoreError> = Ok(Some(Item::new("A", 1.0)));
        assert_eq!(Response::from_lookup(&present).status, 200);
    }

    #[test]
    fn update_requests_accept_a_set_wrapper() {
        let wrapped: UpdateManyRequest =
            serde_json::from_value(json!({ "filter": { "name": "A" }, "update": { "$set": { "price": 5 } } })).unwrap();
        let plain: UpdateManyRequest = serde_json::from_value(json!({ "update": { "price": 5 } })).unwrap();

        assert_eq!(wrapped.patch(), json!({ "price": 5 }));
        assert_eq!(plain.patch(), json!({ "price": 5 }));
        assert!(wrapped.filter(&ITEM_SCHEMA).unwrap().is_some());
        assert!(plain.filter(&ITEM_SCHEMA).unwrap().is_none());
    }

    #[test]
    fn hostile_filters_are_rejected() {
        let body = json!({ "$where": "sleep(1000)" });
        assert!(delete_many_filter(&body, &ITEM_SCHEMA).is_err());
    }

    #[test]
    fn partial_batches_report_confirmed_documents() {
        let result = InsertManyResult::<Item> {
            inserted: vec![Record { id: "a".into(), body: Item::new("A", 1.0) }],
            failure: Some(BatchFailure { index: 1, error: DocumentStoreError::ConstraintViolation("dup".into()) }),
        };

        let response = InsertManyResponse::from(result).into_response();

        assert_eq!(response.status, 409);
        assert_eq!(response.body["insertedCount"], 1);
        assert_eq!(response.body["error"]["index"], 1);
    }
}
