//! Records and conversions between records and typed values.
//!
//! A [`Record`] is one stored row: an ordered field → value mapping. Records
//! crossing the public API always carry string identifiers (see
//! [`codec`](crate::codec)).

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{TableLayerError, TableLayerResult},
    schema::{ID_FIELD, STORAGE_ID_FIELD},
};

pub type Record = Document;

/// Keeps only the requested fields (plus the identifier) of a record.
///
/// An empty field list returns the record unchanged.
pub fn project<S: AsRef<str>>(record: Record, fields: &[S]) -> Record {
    if fields.is_empty() {
        return record;
    }

    record
        .into_iter()
        .filter(|(key, _)| {
            key == ID_FIELD || key == STORAGE_ID_FIELD || fields.iter().any(|field| field.as_ref() == key)
        })
        .collect()
}

/// Removes fields whose value is null so that "not provided" and "explicitly
/// null" look the same.
pub fn remove_nulls(record: Record) -> Record {
    record
        .into_iter()
        .filter(|(_, value)| !matches!(value, Bson::Null | Bson::Undefined))
        .collect()
}

/// Conversion between serde types and records.
///
/// Implemented for every `Serialize + DeserializeOwned` type so callers can work
/// with typed rows while the engine stays schema-driven.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Category { #[serde(skip_serializing_if = "Option::is_none")] id: Option<String>, name: String }
///
/// let stored = engine.table("category")?.insert(Category { id: None, name: "Books".into() }.to_record()?, &[]).await?;
/// let category = Category::from_record(stored)?;
/// ```
pub trait RecordExt: Sized {
    fn to_record(&self) -> TableLayerResult<Record>;

    fn from_record(record: Record) -> TableLayerResult<Self>;
}

impl<T> RecordExt for T
where
    T: Serialize + DeserializeOwned,
{
    fn to_record(&self) -> TableLayerResult<Record> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(TableLayerError::InvalidDocument(format!(
                "expected a document, found {:?}",
                other.element_type()
            ))),
        }
    }

    fn from_record(record: Record) -> TableLayerResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(record))?)
    }
}
