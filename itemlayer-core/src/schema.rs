//! Field allow-lists and shape validation for untyped request bodies.
//!
//! A [`Schema`] lists every field a document may carry. Bodies arrive as
//! `serde_json::Value` and are checked against the schema before any store call:
//!
//! - fields outside the schema are rejected,
//! - required fields must be present and non-null,
//! - values must match the declared [`FieldKind`],
//! - text fields marked `non_empty` must not be empty.
//!
//! `id` and `_id` are store-assigned and silently dropped from every body.

use bson::{Bson, Document as BsonDocument};
use serde_json::Value;

use crate::{
    backend::UpdateSpec,
    error::{Problem, ValidationError},
};

/// Keys that name the store-assigned id and are never accepted from input.
pub const ID_KEYS: [&str; 2] = ["id", "_id"];

/// The kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// A finite number, stored as a double.
    Number,
    /// A boolean.
    Boolean,
}

/// Definition of one allowed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: &'static str,
    /// Expected value kind.
    pub kind: FieldKind,
    /// Whether the field must be present on full documents.
    pub required: bool,
    /// Whether a text field must be non-empty.
    pub non_empty: bool,
}

impl FieldDef {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: false, non_empty: false }
    }

    /// An optional text field.
    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// An optional number field.
    pub const fn number(name: &'static str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    /// An optional boolean field.
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Marks the field as required.
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks a text field as non-empty.
    pub const fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    /// Converts a JSON value into the BSON stored for this field.
    ///
    /// `null` is handled by the callers, since its meaning depends on the mode.
    pub fn convert(&self, value: &Value) -> Result<Bson, Problem> {
        let bson = self.coerce(value)?;

        match &bson {
            Bson::String(s) if self.non_empty && s.trim().is_empty() => Err(Problem::Empty),
            _ => Ok(bson),
        }
    }

    /// Checks only the kind of a JSON value and converts it to BSON.
    pub fn coerce(&self, value: &Value) -> Result<Bson, Problem> {
        match (self.kind, value) {
            (FieldKind::Text, Value::String(s)) => Ok(Bson::String(s.clone())),
            (FieldKind::Number, Value::Number(n)) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(Bson::Double)
                .ok_or(Problem::WrongType),
            (FieldKind::Boolean, Value::Bool(b)) => Ok(Bson::Boolean(*b)),
            _ => Err(Problem::WrongType),
        }
    }
}

/// The field allow-list of a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [FieldDef],
}

impl Schema {
    /// Creates a schema from a static field list.
    pub const fn new(fields: &'static [FieldDef]) -> Self {
        Self { fields }
    }

    /// Returns all field definitions.
    pub fn fields(&self) -> &'static [FieldDef] {
        self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates a complete document (create and replace).
    ///
    /// Returns the BSON body to persist, without any id key.
    pub fn validate_document(&self, body: &Value) -> Result<BsonDocument, ValidationError> {
        let object = body
            .as_object()
            .ok_or_else(|| ValidationError::single("", Problem::NotAnObject))?;

        let mut errors = ValidationError::default();
        let mut document = BsonDocument::new();

        for (key, value) in object {
            if ID_KEYS.contains(&key.as_str()) {
                continue;
            }

            let Some(def) = self.field(key) else {
                errors.push(key.as_str(), Problem::Unknown);
                continue;
            };

            if value.is_null() {
                if def.required {
                    errors.push(key.as_str(), Problem::Null);
                }
                continue;
            }

            match def.convert(value) {
                Ok(bson) => {
                    document.insert(key.as_str(), bson);
                }
                Err(problem) => errors.push(key.as_str(), problem),
            }
        }

        for def in self.fields.iter().filter(|f| f.required) {
            if !object.contains_key(def.name) {
                errors.push(def.name, Problem::Missing);
            }
        }

        errors.into_result().map(|_| document)
    }

    /// Validates a partial document (update).
    ///
    /// `null` on an optional field becomes an unset; on a required field it is rejected.
    /// The fields may be wrapped in a lone `{"$set": {...}}`.
    pub fn validate_patch(&self, patch: &Value) -> Result<UpdateSpec, ValidationError> {
        let object = patch_fields(patch)
            .as_object()
            .ok_or_else(|| ValidationError::single("", Problem::NotAnObject))?;

        let mut errors = ValidationError::default();
        let mut update = UpdateSpec::default();

        for (key, value) in object {
            if ID_KEYS.contains(&key.as_str()) {
                continue;
            }

            let Some(def) = self.field(key) else {
                errors.push(key.as_str(), Problem::Unknown);
                continue;
            };

            if value.is_null() {
                if def.required {
                    errors.push(key.as_str(), Problem::Null);
                } else {
                    update.unset.push(def.name.to_string());
                }
                continue;
            }

            match def.convert(value) {
                Ok(bson) => {
                    update.set.insert(key.as_str(), bson);
                }
                Err(problem) => errors.push(key.as_str(), problem),
            }
        }

        errors.into_result().map(|_| update)
    }
}

/// Returns the fields of a patch, looking through a lone `$set` wrapper.
pub fn patch_fields(patch: &Value) -> &Value {
    match patch.as_object() {
        Some(object) if object.len() == 1 => object.get("$set").unwrap_or(patch),
        _ => patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    use crate::error::FieldIssue;

    static SCHEMA: Schema = Schema::new(&[
        FieldDef::text("name").required().non_empty(),
        FieldDef::text("description"),
        FieldDef::number("price").required(),
    ]);

    #[test]
    fn accepts_complete_documents_and_drops_ids() {
        let body = SCHEMA
            .validate_document(&json!({ "_id": "x", "id": "y", "name": "A", "price": 10 }))
            .unwrap();

        assert_eq!(body, doc! { "name": "A", "price": 10.0 });
    }

    #[test]
    fn reports_every_issue_at_once() {
        let err = SCHEMA
            .validate_document(&json!({ "name": "", "price": "cheap", "colour": "red" }))
            .unwrap_err();

        assert!(err.issues.contains(&FieldIssue::new("name", Problem::Empty)));
        assert!(err.issues.contains(&FieldIssue::new("price", Problem::WrongType)));
        assert!(err.issues.contains(&FieldIssue::new("colour", Problem::Unknown)));
        assert_eq!(err.index, None);
    }

    #[test]
    fn missing_and_null_required_fields_are_rejected() {
        let err = SCHEMA
            .validate_document(&json!({ "name": null }))
            .unwrap_err();

        assert!(err.issues.contains(&FieldIssue::new("name", Problem::Null)));
        assert!(err.issues.contains(&FieldIssue::new("price", Problem::Missing)));
    }

    #[test]
    fn rejects_non_objects() {
        let err = SCHEMA.validate_document(&json!([1, 2])).unwrap_err();
        assert_eq!(err.issues, vec![FieldIssue::new("", Problem::NotAnObject)]);
    }

    #[test]
    fn patch_sets_and_unsets() {
        let update = SCHEMA
            .validate_patch(&json!({ "id": "ignored", "price": 5, "description": null }))
            .unwrap();

        assert_eq!(update.set, doc! { "price": 5.0 });
        assert_eq!(update.unset, vec!["description".to_string()]);
    }

    #[test]
    fn patch_looks_through_a_set_wrapper() {
        let update = SCHEMA
            .validate_patch(&json!({ "$set": { "price": 5, "description": null } }))
            .unwrap();

        assert_eq!(update.set, doc! { "price": 5.0 });
        assert_eq!(update.unset, vec!["description".to_string()]);

        let err = SCHEMA
            .validate_patch(&json!({ "$set": { "price": 5 }, "$inc": { "price": 1 } }))
            .unwrap_err();
        assert!(err.issues.contains(&FieldIssue::new("$inc", Problem::Unknown)));
    }

    #[test]
    fn patch_cannot_null_required_fields() {
        let err = SCHEMA.validate_patch(&json!({ "name": null })).unwrap_err();
        assert_eq!(err.issues, vec![FieldIssue::new("name", Problem::Null)]);
    }

    #[test]
    fn whitespace_only_names_count_as_empty() {
        assert_eq!(
            SCHEMA.field("name").unwrap().convert(&json!("   ")),
            Err(Problem::Empty)
        );
    }
}
