//! Error types and result types for table access operations.
//!
//! Every fallible operation in this crate returns [`TableLayerResult<T>`]. Caller
//! mistakes (unknown table, schema violation, malformed identifier) are detected
//! before the backend is touched; backend failures pass through as
//! [`TableLayerError::Backend`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the access layer.
#[derive(Error, Debug)]
pub enum TableLayerError {
    /// The table name is not declared in the schema registry.
    #[error("table {0} does not exist")]
    UnknownTable(String),
    /// A record failed schema validation.
    ///
    /// `path` names the first offending field, `message` describes the violation.
    #[error("{path} {message}")]
    Validation { path: String, message: String },
    /// A string could not be parsed as a native identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// A create or drop step failed while converging live schema to the registry.
    #[error("failed to {action} {target}: {message}")]
    Reconciliation {
        action: String,
        target: String,
        message: String,
    },
    /// The payload or query is structurally unusable (e.g. unsupported operator).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error reported by the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl TableLayerError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        TableLayerError::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the failure stems from caller input rather than the store.
    ///
    /// Transport layers use this to choose between a client and a server error response.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            TableLayerError::UnknownTable(_)
                | TableLayerError::Validation { .. }
                | TableLayerError::InvalidIdentifier(_)
                | TableLayerError::InvalidDocument(_)
        )
    }
}

/// A specialized `Result` type for access layer operations.
pub type TableLayerResult<T> = Result<T, TableLayerError>;

impl From<BsonError> for TableLayerError {
    fn from(err: BsonError) -> Self {
        TableLayerError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for TableLayerError {
    fn from(err: SerdeJsonError) -> Self {
        TableLayerError::Serialization(err.to_string())
    }
}
