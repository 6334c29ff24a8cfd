//! Identifier and date translation between the wire and storage representations.
//!
//! The public API is string-identifier based: the primary key travels as `id`
//! (a hex string) and reference fields such as `user_id` are strings too. The
//! store keeps the primary key as `_id` and every identifier as a native
//! [`ObjectId`] so lookups and reference matches hit indexes. Dates are always
//! surfaced as ISO-8601 strings.
//!
//! Which fields hold identifiers is decided by an explicit [`IdentifierPolicy`]
//! rather than by implicit name matching scattered through the engine.

use bson::{Bson, DateTime, Document, oid::ObjectId};
use chrono::{SecondsFormat, Utc};

use crate::{
    error::{TableLayerError, TableLayerResult},
    schema::{ID_FIELD, STORAGE_ID_FIELD},
};

/// A single naming rule marking a field as an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierRule {
    /// The field name equals the value.
    Exact(String),
    /// The field name ends with the value, e.g. `_id` matches `user_id`.
    Suffix(String),
    /// The field name contains the value anywhere.
    Contains(String),
}

impl IdentifierRule {
    pub fn matches(&self, field: &str) -> bool {
        match self {
            IdentifierRule::Exact(name) => field == name,
            IdentifierRule::Suffix(suffix) => field.ends_with(suffix.as_str()),
            IdentifierRule::Contains(needle) => field.contains(needle.as_str()),
        }
    }
}

/// Decides which top-level fields carry native identifiers in storage.
///
/// The default treats `_id` and every field ending in `_id` as an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierPolicy {
    rules: Vec<IdentifierRule>,
}

impl IdentifierPolicy {
    pub fn new(rules: impl IntoIterator<Item = IdentifierRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// A policy under which only the storage primary key is an identifier.
    pub fn primary_only() -> Self {
        Self::new([IdentifierRule::Exact(STORAGE_ID_FIELD.to_string())])
    }

    pub fn with_rule(mut self, rule: IdentifierRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_identifier(&self, field: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(field))
    }

    /// Converts string values of identifier fields into native identifiers.
    ///
    /// Only top-level string values are converted; operator documents and other
    /// values are passed through unchanged.
    pub fn encode(&self, record: Document) -> TableLayerResult<Document> {
        record
            .into_iter()
            .map(|(key, value)| match value {
                Bson::String(s) if self.is_identifier(&key) => {
                    Ok((key, Bson::ObjectId(to_native_id(&s)?)))
                }
                value => Ok((key, value)),
            })
            .collect()
    }

    /// Rewrites a caller filter into storage form.
    ///
    /// A top-level `id` key becomes `_id`, then identifier fields are encoded.
    pub fn translate_filter(&self, filter: Document) -> TableLayerResult<Document> {
        self.encode(
            filter
                .into_iter()
                .map(|(key, value)| {
                    if key == ID_FIELD {
                        (STORAGE_ID_FIELD.to_string(), value)
                    } else {
                        (key, value)
                    }
                })
                .collect(),
        )
    }
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self::new([
            IdentifierRule::Exact(STORAGE_ID_FIELD.to_string()),
            IdentifierRule::Suffix(STORAGE_ID_FIELD.to_string()),
        ])
    }
}

/// Parses a string identifier into the store's native identifier type.
pub fn to_native_id(value: &str) -> TableLayerResult<ObjectId> {
    ObjectId::parse_str(value).map_err(|_| TableLayerError::InvalidIdentifier(value.to_string()))
}

pub fn to_string_id(id: &ObjectId) -> String {
    id.to_hex()
}

/// Renders a date as an ISO-8601 UTC string with millisecond precision.
pub fn format_date(date: &DateTime) -> String {
    date.to_chrono()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time in the same representation as [`format_date`].
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Converts top-level native dates into ISO-8601 strings.
pub fn normalize_dates(record: Document) -> Document {
    record
        .into_iter()
        .map(|(key, value)| match value {
            Bson::DateTime(date) => (key, Bson::String(format_date(&date))),
            value => (key, value),
        })
        .collect()
}

/// Converts top-level native identifiers into their string form.
pub fn stringify_ids(record: Document) -> Document {
    record
        .into_iter()
        .map(|(key, value)| match value {
            Bson::ObjectId(id) => (key, Bson::String(to_string_id(&id))),
            value => (key, value),
        })
        .collect()
}

/// Converts a stored record into the shape returned to callers.
///
/// `_id` is surfaced as `id` and every native identifier becomes a string.
pub fn to_wire(record: Document) -> Document {
    stringify_ids(
        record
            .into_iter()
            .map(|(key, value)| {
                if key == STORAGE_ID_FIELD {
                    (ID_FIELD.to_string(), value)
                } else {
                    (key, value)
                }
            })
            .collect(),
    )
}
