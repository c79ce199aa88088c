//! Filter construction, projections and a visitor pattern for backend translation.
//!
//! Filters are a small typed AST ([`Expr`]). Backends never see caller-supplied query
//! objects: JSON filters coming from a transport are parsed with [`parse_filter`], which
//! only accepts fields of the document schema and a fixed set of operators.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides static constructors:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`, `all`
//!
//! ```ignore
//! use itemlayer_core::query::Filter;
//!
//! let cheap_apples = Filter::eq("name", "apple").and(Filter::lt("price", 2.5));
//! ```

use bson::{Bson, Document as BsonDocument};
use serde_json::Value;

use crate::{
    error::{DocumentStoreError, Problem, ValidationError},
    schema::{ID_KEYS, Schema},
};

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field equals any of the values.
    AnyOf,
    /// Field equals none of the values.
    NoneOf,
}

/// A filter expression for matching documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). An empty list matches
    /// every document.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match). An empty list matches
    /// nothing.
    Or(Vec<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }
}

/// Helper struct for constructing filter expressions.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression may match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches every document.
    pub fn all() -> Expr {
        Expr::And(Vec::new())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

/// Parses a JSON filter object into a typed expression.
///
/// The accepted grammar is a subset of MongoDB's query language:
///
/// - `{"field": value}` is an equality test,
/// - `{"field": {"$op": value, ...}}` with `$eq $ne $gt $gte $lt $lte $in $nin $exists`,
/// - `{"$and": [filter, ...]}` and `{"$or": [filter, ...]}` with at least one filter.
///
/// Fields must belong to `schema` and values must match the field kind. `null` and `{}`
/// both return `Ok(None)`, which matches every document. A `{}` nested in `$and` or
/// `$or` becomes [`Filter::all`].
pub fn parse_filter(value: &Value, schema: &Schema) -> Result<Option<Expr>, ValidationError> {
    if value.is_null() {
        return Ok(None);
    }

    let mut errors = ValidationError::default();
    let expr = FilterParser { schema, errors: &mut errors }.parse_object(value);

    errors.into_result().map(|_| expr)
}

struct FilterParser<'a> {
    schema: &'a Schema,
    errors: &'a mut ValidationError,
}

impl FilterParser<'_> {
    fn parse_object(&mut self, value: &Value) -> Option<Expr> {
        let Some(object) = value.as_object() else {
            self.errors.push("", Problem::NotAnObject);
            return None;
        };

        let mut exprs = Vec::with_capacity(object.len());

        for (key, value) in object {
            match key.as_str() {
                "$and" | "$or" => {
                    let items = match value.as_array() {
                        Some(items) if !items.is_empty() => items,
                        _ => {
                            self.errors.push(key.as_str(), Problem::WrongType);
                            continue;
                        }
                    };

                    let parts = items
                        .iter()
                        .map(|item| self.parse_clause(item))
                        .collect::<Vec<_>>();

                    exprs.push(if key == "$and" { Expr::And(parts) } else { Expr::Or(parts) });
                }
                op if op.starts_with('$') => self.errors.push(op, Problem::UnsupportedOperator),
                field if ID_KEYS.contains(&field) => self.errors.push(field, Problem::Unknown),
                field => exprs.extend(self.parse_field(field, value)),
            }
        }

        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Expr::And(exprs)),
        }
    }

    /// Parses one element of a combinator. An empty object matches everything.
    fn parse_clause(&mut self, value: &Value) -> Expr {
        self.parse_object(value).unwrap_or_else(Filter::all)
    }

    fn parse_field(&mut self, field: &str, value: &Value) -> Vec<Expr> {
        let Some(def) = self.schema.field(field) else {
            self.errors.push(field, Problem::Unknown);
            return vec![];
        };

        let Some(operators) = value.as_object() else {
            return self
                .operand(field, value, |v| def.coerce(v))
                .map(|v| vec![Filter::eq(field, v)])
                .unwrap_or_default();
        };

        if operators.is_empty() {
            self.errors.push(field, Problem::WrongType);
        }

        let mut exprs = Vec::with_capacity(operators.len());

        for (op, operand) in operators {
            let op = match op.as_str() {
                "$eq" => FieldOp::Eq,
                "$ne" => FieldOp::Ne,
                "$gt" => FieldOp::Gt,
                "$gte" => FieldOp::Gte,
                "$lt" => FieldOp::Lt,
                "$lte" => FieldOp::Lte,
                "$in" => FieldOp::AnyOf,
                "$nin" => FieldOp::NoneOf,
                "$exists" => {
                    match operand.as_bool() {
                        Some(flag) => exprs.push(Expr::Exists(field.to_string(), flag)),
                        None => self.errors.push(field, Problem::WrongType),
                    }
                    continue;
                }
                _ => {
                    self.errors.push(field, Problem::UnsupportedOperator);
                    continue;
                }
            };

            let converted = match op {
                FieldOp::AnyOf | FieldOp::NoneOf => self.operand(field, operand, |v| {
                    v.as_array()
                        .ok_or(Problem::WrongType)?
                        .iter()
                        .map(|item| def.coerce(item))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Bson::Array)
                }),
                _ => self.operand(field, operand, |v| def.coerce(v)),
            };

            if let Some(value) = converted {
                exprs.push(Expr::field(field.to_string(), op, value));
            }
        }

        exprs
    }

    fn operand(
        &mut self,
        field: &str,
        value: &Value,
        convert: impl FnOnce(&Value) -> Result<Bson, Problem>,
    ) -> Option<Bson> {
        if value.is_null() {
            return Some(Bson::Null);
        }

        match convert(value) {
            Ok(value) => Some(value),
            Err(problem) => {
                self.errors.push(field, problem);
                None
            }
        }
    }
}

/// The set of fields a read should return. The id is always returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    /// Creates a projection keeping the given fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(Into::into)
                .filter(|f| !ID_KEYS.contains(&f.as_str()))
                .collect(),
        }
    }

    /// Returns the projected field names, excluding the id.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Checks that every projected field belongs to the schema.
    pub fn validate(&self, schema: &Schema) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();

        for field in self.fields.iter().filter(|f| schema.field(f).is_none()) {
            errors.push(field.as_str(), Problem::Unknown);
        }

        errors.into_result()
    }

    /// Keeps only the projected fields of a body.
    pub fn apply(&self, body: &BsonDocument) -> BsonDocument {
        body.iter()
            .filter(|(k, _)| self.fields.iter().any(|f| f == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    use crate::{error::FieldIssue, schema::FieldDef};

    static SCHEMA: Schema = Schema::new(&[
        FieldDef::text("name").required().non_empty(),
        FieldDef::text("description"),
        FieldDef::number("price").required(),
    ]);

    #[test]
    fn empty_filters_match_everything() {
        assert_eq!(parse_filter(&json!({}), &SCHEMA).unwrap(), None);
        assert_eq!(parse_filter(&Value::Null, &SCHEMA).unwrap(), None);
    }

    #[test]
    fn plain_values_are_equality() {
        assert_eq!(
            parse_filter(&json!({ "name": "A" }), &SCHEMA).unwrap(),
            Some(Filter::eq("name", "A"))
        );
    }

    #[test]
    fn operators_and_combinators_are_translated() {
        let expr = parse_filter(
            &json!({
                "price": { "$gte": 10, "$lt": 20 },
                "$or": [{ "name": "A" }, { "description": { "$exists": false } }],
            }),
            &SCHEMA,
        )
        .unwrap()
        .unwrap();

        let Expr::And(parts) = expr else { panic!("expected a conjunction") };
        assert!(parts.contains(&Filter::gte("price", 10.0)));
        assert!(parts.contains(&Filter::lt("price", 20.0)));
        assert!(parts.contains(&Filter::or([
            Filter::eq("name", "A"),
            Filter::not_exists("description"),
        ])));
    }

    #[test]
    fn membership_operands_must_be_arrays_of_the_field_kind() {
        assert_eq!(
            parse_filter(&json!({ "price": { "$in": [1, 2] } }), &SCHEMA).unwrap(),
            Some(Filter::any_of("price", vec![Bson::Double(1.0), Bson::Double(2.0)]))
        );

        let err = parse_filter(&json!({ "price": { "$in": [1, "two"] } }), &SCHEMA).unwrap_err();
        assert_eq!(err.issues, vec![FieldIssue::new("price", Problem::WrongType)]);
    }

    #[test]
    fn hostile_filters_are_rejected() {
        let err = parse_filter(
            &json!({
                "$where": "sleep(1000)",
                "secret": 1,
                "name": { "$regex": ".*" },
                "_id": { "$ne": null },
            }),
            &SCHEMA,
        )
        .unwrap_err();

        assert!(err.issues.contains(&FieldIssue::new("$where", Problem::UnsupportedOperator)));
        assert!(err.issues.contains(&FieldIssue::new("secret", Problem::Unknown)));
        assert!(err.issues.contains(&FieldIssue::new("name", Problem::UnsupportedOperator)));
        assert!(err.issues.contains(&FieldIssue::new("_id", Problem::Unknown)));
    }

    #[test]
    fn empty_clauses_inside_combinators_match_everything() {
        assert_eq!(
            parse_filter(&json!({ "$or": [{}, { "name": "A" }] }), &SCHEMA).unwrap(),
            Some(Filter::or([Filter::all(), Filter::eq("name", "A")]))
        );
        assert_eq!(
            parse_filter(&json!({ "$and": [{}] }), &SCHEMA).unwrap(),
            Some(Filter::and([Filter::all()]))
        );
    }

    #[test]
    fn empty_combinator_arrays_are_rejected() {
        for filter in [json!({ "$and": [] }), json!({ "$or": [] }), json!({ "$or": {} })] {
            let key = filter.as_object().unwrap().keys().next().unwrap().clone();
            let err = parse_filter(&filter, &SCHEMA).unwrap_err();
            assert_eq!(err.issues, vec![FieldIssue::new(key, Problem::WrongType)]);
        }
    }

    #[test]
    fn filters_do_not_apply_the_non_empty_rule() {
        assert_eq!(
            parse_filter(&json!({ "name": "" }), &SCHEMA).unwrap(),
            Some(Filter::eq("name", ""))
        );
    }

    #[test]
    fn projection_drops_id_keys_and_checks_fields() {
        let projection = Projection::new(["id", "name", "description"]);
        assert_eq!(projection.fields(), ["name".to_string(), "description".to_string()]);
        assert!(projection.validate(&SCHEMA).is_ok());

        let body = doc! { "name": "A", "description": "d", "price": 3.0 };
        assert_eq!(projection.apply(&body), doc! { "name": "A", "description": "d" });

        let err = Projection::new(["colour"]).validate(&SCHEMA).unwrap_err();
        assert_eq!(err.issues, vec![FieldIssue::new("colour", Problem::Unknown)]);
    }
}
