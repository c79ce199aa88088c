//! Core traits and types for document representation and serialization.
//!
//! A [`Document`] is the body of a stored record: every field except the id. The id is
//! assigned by the store on insert and travels next to the body in [`StoredDocument`]
//! (backend side) and [`Record`] (caller side).

use bson::{Bson, Document as BsonDocument, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, to_value};
use std::fmt::{self, Debug};

use crate::{error::DocumentStoreResult, schema::Schema};

/// Core trait that all document bodies stored through a repository must implement.
///
/// # Example
///
/// ```ignore
/// use itemlayer_core::{document::Document, schema::{Schema, FieldDef}};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Note {
///     pub title: String,
/// }
///
/// static NOTE_SCHEMA: Schema = Schema::new(&[FieldDef::text("title").required()]);
///
/// impl Document for Note {
///     fn collection_name() -> &'static str { "notes" }
///     fn schema() -> &'static Schema { &NOTE_SCHEMA }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Clone + Debug + 'static {
    /// Returns the name of the collection this document belongs to.
    fn collection_name() -> &'static str;

    /// Returns the field allow-list used to validate untyped input.
    fn schema() -> &'static Schema;
}

/// Extension trait providing BSON/JSON conversions for documents.
///
/// Automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a BSON document for storage.
    fn to_body(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a document from a stored BSON body.
    fn from_body(body: BsonDocument) -> DocumentStoreResult<Self>;

    /// Converts this document to a JSON value.
    fn to_json(&self) -> DocumentStoreResult<Value>;
}

impl<D: Document> DocumentExt for D {
    fn to_body(&self) -> DocumentStoreResult<BsonDocument> {
        Ok(serialize_to_document(self)?)
    }

    fn from_body(body: BsonDocument) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(body)?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }
}

/// Opaque, store-assigned document identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wraps a raw id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A document as it crosses the backend boundary: id plus BSON body (without id).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Store-assigned id.
    pub id: DocumentId,
    /// The document fields.
    pub body: BsonDocument,
}

impl StoredDocument {
    /// Creates a stored document.
    pub fn new(id: DocumentId, body: BsonDocument) -> Self {
        Self { id, body }
    }
}

/// A typed document returned to callers, with its id.
///
/// Serializes flat: `{"id": "...", "name": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<D> {
    /// Store-assigned id.
    pub id: DocumentId,
    /// The typed document body.
    #[serde(flatten)]
    pub body: D,
}

/// A projected document: the id plus whichever fields the projection kept.
pub type PartialRecord = Record<Map<String, Value>>;

/// Conversion from the backend representation into what a caller sees.
pub trait FromStored: Sized + Send + 'static {
    /// Converts a stored document.
    fn from_stored(stored: StoredDocument) -> DocumentStoreResult<Self>;
}

impl<D: Document> FromStored for Record<D> {
    fn from_stored(stored: StoredDocument) -> DocumentStoreResult<Self> {
        Ok(Record {
            id: stored.id,
            body: D::from_body(stored.body)?,
        })
    }
}

impl FromStored for PartialRecord {
    fn from_stored(stored: StoredDocument) -> DocumentStoreResult<Self> {
        let body = match Bson::Document(stored.body).into_relaxed_extjson() {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Ok(Record { id: stored.id, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    use crate::schema::FieldDef;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
    }

    static NOTE_SCHEMA: Schema = Schema::new(&[FieldDef::text("title").required()]);

    impl Document for Note {
        fn collection_name() -> &'static str {
            "notes"
        }

        fn schema() -> &'static Schema {
            &NOTE_SCHEMA
        }
    }

    #[test]
    fn record_serializes_flat() {
        let record = Record::<Note>::from_stored(StoredDocument::new(
            "n1".into(),
            doc! { "title": "groceries" },
        ))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({ "id": "n1", "title": "groceries" })
        );
    }

    #[test]
    fn partial_record_keeps_id_and_listed_fields() {
        let record = PartialRecord::from_stored(StoredDocument::new(
            "n2".into(),
            doc! { "title": "todo" },
        ))
        .unwrap();

        assert_eq!(record.id.as_str(), "n2");
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({ "id": "n2", "title": "todo" })
        );
    }
}
