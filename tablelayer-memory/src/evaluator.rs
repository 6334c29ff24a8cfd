//! Query expression evaluation for in-memory record filtering.
//!
//! This module provides the evaluation engine for query expressions and the
//! ordering used when sorting, following the document database's rules closely
//! enough for tests: missing fields equal `null`, `$ne`/`$nin` match documents
//! without the field, equality against an array field matches any element, and
//! values of different types sort by type rank.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use tablelayer_core::{
    error::{TableLayerError, TableLayerResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the store's cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting; values of different types order by rank.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => self.partial_cmp(other).unwrap_or(Ordering::Equal),
            ordering => ordering,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Lower-cased word tokens of a string.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    text_fields: &'a [String],
}

impl<'a> DocumentEvaluator<'a> {
    /// `text_fields` are the fields covered by the collection's text indexes.
    pub fn new(document: &'a Document, text_fields: &'a [String]) -> Self {
        Self { document, text_fields }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> TableLayerResult<bool> {
        self.visit_expr(expr)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        expr: &Expr,
        text_fields: &'a [String],
    ) -> TableLayerResult<Vec<&'a Document>> {
        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::new(document, text_fields).evaluate(expr)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn contains<'v>(values: &[Comparable<'v>], field_value: &Comparable<'v>) -> bool {
        match field_value {
            Comparable::Array(items) => items.iter().any(|item| values.contains(item)),
            single => values.contains(single),
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = TableLayerError;

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

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(self.document.contains_key(field) == should_exist)
    }

    fn visit_text(&mut self, term: &str) -> Result<Self::Output, Self::Error> {
        if self.text_fields.is_empty() {
            return Err(TableLayerError::Backend(
                "text index required for $text query".to_string(),
            ));
        }

        let terms = words(term).collect::<Vec<_>>();
        Ok(self
            .text_fields
            .iter()
            .filter_map(|field| match self.document.get(field) {
                Some(Bson::String(text)) => Some(text),
                _ => None,
            })
            .any(|text| words(text).any(|word| terms.contains(&word))))
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = self.document.get(field) else {
            return Ok(match op {
                FieldOp::Ne | FieldOp::NoneOf => true,
                FieldOp::Eq => matches!(value, Bson::Null),
                _ => false,
            });
        };

        let left = Comparable::from(field_value);
        let right = Comparable::from(value);
        Ok(match op {
            FieldOp::Eq => left == right || Self::contains(std::slice::from_ref(&right), &left),
            FieldOp::Ne => !(left == right || Self::contains(std::slice::from_ref(&right), &left)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => match left.partial_cmp(&right) {
                Some(ordering) => match op {
                    FieldOp::Gt => ordering == Ordering::Greater,
                    FieldOp::Gte => ordering != Ordering::Less,
                    FieldOp::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                },
                None => false,
            },
            FieldOp::AnyOf | FieldOp::NoneOf => {
                let found = match right {
                    Comparable::Array(values) => Self::contains(&values, &left),
                    _ => false,
                };
                (*op == FieldOp::AnyOf) == found
            }
        })
    }
}
