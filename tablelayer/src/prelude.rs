//! Convenient re-exports of commonly used types from tablelayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use tablelayer::prelude::*;
//! ```

pub use tablelayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    engine::{EngineOptions, QueryEngine},
    table::{FilterOptions, Table},
    registry::SchemaRegistry,
    schema::{IndexDeclaration, IndexKey, ObjectShape, Property, PropertyFormat, PropertyKind, TableDefinition},
    codec::{IdentifierPolicy, IdentifierRule},
    validator::{AdditionalProperties, Operation, Validator},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    page::{Filtered, Page, Pagination},
    record::{Record, RecordExt},
    reconcile::{Reconciler, SchemaChanges},
    trace::TracedBackend,
    error::{TableLayerError, TableLayerResult},
};
