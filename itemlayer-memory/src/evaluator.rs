//! Filter evaluation against in-memory document bodies.
//!
//! Numeric values are compared as `f64` whatever their BSON width, so a filter built with
//! an integer literal matches a price stored as a double. A field missing from the body
//! compares as `null`, so `{"description": null}` matches it and `$ne: null` does not.

use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use itemlayer_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Comparable view of a BSON value.
#[derive(Debug, PartialEq)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    /// Any other BSON type.
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(values) => Comparable::Array(values.iter().map(Comparable::from).collect()),
            _ => Comparable::Opaque,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Returns the numeric value of a field, if it holds one.
pub(crate) fn as_number(value: &Bson) -> Option<f64> {
    match Comparable::from(value) {
        Comparable::Number(number) => Some(number),
        _ => None,
    }
}

/// Returns `true` if `body` satisfies `filter`. `None` matches every body.
pub(crate) fn matches(body: &BsonDocument, filter: Option<&Expr>) -> bool {
    match filter {
        Some(expr) => DocumentEvaluator::new(body)
            .evaluate(expr)
            .unwrap_or(false),
        None => true,
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a BsonDocument,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a BsonDocument) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<bool, DocumentStoreError> {
        self.visit_expr(expr)
    }
}

fn any_of(field: &Comparable<'_>, values: &Comparable<'_>) -> bool {
    match (field, values) {
        (Comparable::Array(items), Comparable::Array(values)) => {
            values.iter().any(|value| items.contains(value))
        }
        (single, Comparable::Array(values)) => values.contains(single),
        (Comparable::Array(items), single) => items.contains(single),
        _ => false,
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(self.document.contains_key(field) == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let left = self.document.get(field).map_or(Comparable::Null, Comparable::from);
        let right = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => left == right,
            FieldOp::Ne => left != right,
            FieldOp::Gt => left.partial_cmp(&right) == Some(Ordering::Greater),
            FieldOp::Gte => matches!(left.partial_cmp(&right), Some(Ordering::Greater | Ordering::Equal)),
            FieldOp::Lt => left.partial_cmp(&right) == Some(Ordering::Less),
            FieldOp::Lte => matches!(left.partial_cmp(&right), Some(Ordering::Less | Ordering::Equal)),
            FieldOp::AnyOf => any_of(&left, &right),
            FieldOp::NoneOf => !any_of(&left, &right),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use itemlayer_core::query::Filter;

    fn lamp() -> BsonDocument {
        doc! { "name": "Desk Lamp", "price": 25.0 }
    }

    #[test]
    fn numbers_compare_across_widths() {
        assert!(matches(&lamp(), Some(&Filter::eq("price", 25))));
        assert!(matches(&lamp(), Some(&Filter::gte("price", 20_i64))));
        assert!(!matches(&lamp(), Some(&Filter::lt("price", 25))));
    }

    #[test]
    fn missing_fields_compare_as_null() {
        let body = lamp();
        let described = doc! { "name": "Desk Lamp", "description": "brass", "price": 25.0 };

        assert!(matches(&body, Some(&Filter::eq("description", Bson::Null))));
        assert!(!matches(&described, Some(&Filter::eq("description", Bson::Null))));
        assert!(!matches(&body, Some(&Filter::ne("description", Bson::Null))));
        assert!(matches(&described, Some(&Filter::ne("description", Bson::Null))));
        assert!(matches(&body, Some(&Filter::any_of("description", vec![Bson::Null]))));
        assert!(!matches(&body, Some(&Filter::none_of("description", vec![Bson::Null]))));
    }

    #[test]
    fn missing_fields_fail_other_comparisons() {
        let body = lamp();

        assert!(matches(&body, Some(&Filter::ne("description", "x"))));
        assert!(matches(&body, Some(&Filter::none_of("description", vec!["x"]))));
        assert!(!matches(&body, Some(&Filter::eq("description", "x"))));
        assert!(!matches(&body, Some(&Filter::gt("description", "a"))));
        assert!(matches(&body, Some(&Filter::not_exists("description"))));
    }

    #[test]
    fn empty_combinators() {
        let body = lamp();

        assert!(matches(&body, Some(&Filter::all())));
        assert!(matches(&body, Some(&Filter::or([Filter::all(), Filter::eq("name", "Chair")]))));
        assert!(!matches(&body, Some(&Filter::or(Vec::<Expr>::new()))));
    }

    #[test]
    fn membership_and_logic() {
        let body = lamp();
        let cheap_or_lamp = Filter::or([Filter::lt("price", 5), Filter::any_of("name", vec!["Desk Lamp", "Chair"])]);

        assert!(matches(&body, Some(&cheap_or_lamp)));
        assert!(!matches(&body, Some(&Filter::and([cheap_or_lamp, Filter::gt("price", 30)]))));
        assert!(matches(&body, None));
    }
}
