//! Query construction and filtering API for table backends.
//!
//! Callers express filter criteria as documents (`{ "role": "admin", "age": { "$gte": 18 } }`);
//! the engine parses them into the backend-neutral [`Expr`] tree, which each
//! backend consumes through a [`QueryVisitor`]: the MongoDB backend translates it
//! back into a native filter document, the in-memory backend evaluates it.
//!
//! # Query Building
//!
//! ```ignore
//! use tablelayer_core::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("role", "admin").and(Filter::gte("age", 18)))
//!     .project(["email"])
//!     .sort("created_date", SortDirection::Asc)
//!     .limit(10)
//!     .offset(20)
//!     .build();
//! ```
//!
//! # Criteria Documents
//!
//! [`Expr::from_criteria`] understands plain equality, the field operators
//! `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, the
//! top-level combinators `$and`/`$or` and `$text: { $search }`. Anything else is
//! rejected with [`TableLayerError::InvalidDocument`].

use bson::{Bson, Document};

use crate::error::{TableLayerError, TableLayerResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
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
    /// Value is one of the given values.
    AnyOf,
    /// Value is none of the given values.
    NoneOf,
}

/// A filter expression for querying records.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). An empty list matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Full-text search over the table's text-indexed fields.
    Text(String),
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
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
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
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Whether the expression holds for every record, e.g. an empty conjunction.
    pub fn matches_everything(&self) -> bool {
        match self {
            Expr::And(exprs) => exprs.iter().all(Expr::matches_everything),
            Expr::Or(exprs) => exprs.iter().any(Expr::matches_everything),
            _ => false,
        }
    }

    /// Parses a criteria document. An empty document yields `None` (match all).
    pub fn from_criteria(criteria: &Document) -> TableLayerResult<Option<Expr>> {
        if criteria.is_empty() {
            return Ok(None);
        }

        parse_document(criteria).map(Some)
    }
}

fn parse_document(criteria: &Document) -> TableLayerResult<Expr> {
    let mut exprs = criteria
        .iter()
        .map(|(key, value)| parse_entry(key, value))
        .collect::<TableLayerResult<Vec<_>>>()?;

    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

fn parse_entry(key: &str, value: &Bson) -> TableLayerResult<Expr> {
    match key {
        "$and" => Ok(Expr::And(parse_list(key, value)?)),
        "$or" => Ok(Expr::Or(parse_list(key, value)?)),
        "$text" => match value {
            Bson::Document(text) => match text.get("$search") {
                Some(Bson::String(term)) => Ok(Expr::Text(term.clone())),
                _ => Err(invalid("$text requires a string $search")),
            },
            _ => Err(invalid("$text requires a document")),
        },
        _ if key.starts_with('$') => Err(invalid(format!("unsupported operator {key}"))),
        field => match value {
            Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                let mut exprs = ops
                    .iter()
                    .map(|(op, operand)| parse_operator(field, op, operand))
                    .collect::<TableLayerResult<Vec<_>>>()?;

                Ok(match exprs.len() {
                    1 => exprs.remove(0),
                    _ => Expr::And(exprs),
                })
            }
            value => Ok(Filter::eq(field, value.clone())),
        },
    }
}

fn parse_list(key: &str, value: &Bson) -> TableLayerResult<Vec<Expr>> {
    match value {
        Bson::Array(items) if items.is_empty() => Err(invalid(format!("{key} requires a non-empty array"))),
        Bson::Array(items) => items
            .iter()
            .map(|item| match item {
                Bson::Document(criteria) => parse_document(criteria),
                _ => Err(invalid(format!("{key} items must be documents"))),
            })
            .collect(),
        _ => Err(invalid(format!("{key} requires an array"))),
    }
}

fn parse_operator(field: &str, op: &str, operand: &Bson) -> TableLayerResult<Expr> {
    let operand = operand.clone();

    match op {
        "$eq" => Ok(Filter::eq(field, operand)),
        "$ne" => Ok(Filter::ne(field, operand)),
        "$gt" => Ok(Filter::gt(field, operand)),
        "$gte" => Ok(Filter::gte(field, operand)),
        "$lt" => Ok(Filter::lt(field, operand)),
        "$lte" => Ok(Filter::lte(field, operand)),
        "$in" | "$nin" => match operand {
            Bson::Array(_) if op == "$in" => Ok(Filter::any_of(field, operand)),
            Bson::Array(_) => Ok(Filter::none_of(field, operand)),
            _ => Err(invalid(format!("{op} on {field} requires an array"))),
        },
        "$exists" => match operand {
            Bson::Boolean(true) => Ok(Filter::exists(field)),
            Bson::Boolean(false) => Ok(Filter::not_exists(field)),
            Bson::Int32(n) => Ok(Expr::Exists(field.to_string(), n != 0)),
            Bson::Int64(n) => Ok(Expr::Exists(field.to_string(), n != 0)),
            _ => Err(invalid(format!("$exists on {field} requires a boolean"))),
        },
        _ => Err(invalid(format!("unsupported operator {op} on {field}"))),
    }
}

fn invalid(message: impl Into<String>) -> TableLayerError {
    TableLayerError::InvalidDocument(message.into())
}

/// A structured query for retrieving records.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match records.
    pub filter: Option<Expr>,
    /// Fields to return. Empty means every field.
    pub projection: Vec<String>,
    /// Sort keys in priority order.
    pub sort: Vec<Sort>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Number of records to skip (for pagination).
    pub offset: Option<usize>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Helper struct for constructing filter expressions.
pub struct Filter;

impl Filter {
    /// Matches records where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches records where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches records where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches records where the field is missing.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches records where the field equals any of the values (an array).
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches records where the field equals none of the values (an array).
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Full-text search over text-indexed fields.
    pub fn text(term: impl Into<String>) -> Expr {
        Expr::Text(term.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the filter if one is given, leaving the query unfiltered otherwise.
    pub fn filter_opt(mut self, filter: Option<Expr>) -> Self {
        self.query.filter = filter;
        self
    }

    pub fn project<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.query.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort::new(field, direction));
        self
    }

    pub fn sorts(mut self, sorts: impl IntoIterator<Item = Sort>) -> Self {
        self.query.sort.extend(sorts);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<TableLayerError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_text(&mut self, term: &str) -> Result<Self::Output, Self::Error>;
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
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Text(term) => self.visit_text(term),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
