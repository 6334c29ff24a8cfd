//! Converging the live store toward the declared schema.
//!
//! The registry is the source of truth. [`Reconciler::reconcile`] runs two phases:
//!
//! 1. **Tables**: create every declared table missing from the store and drop
//!    every live collection the registry does not declare. This phase finishes
//!    for all tables before any index work starts.
//! 2. **Indexes**: for each declared table, create the declared indexes missing
//!    live and drop the live indexes no longer declared. The primary index `_id_`
//!    is never touched. Creations and drops of one table run concurrently.
//!
//! Dropping undeclared collections destroys their data. Make sure the registry is
//! complete before reconciling a non-empty store; [`Reconciler::plan`] shows what
//! would change without changing anything.
//!
//! Any failed step aborts the run with [`TableLayerError::Reconciliation`]. Steps
//! already applied stay applied; running again resumes from the current state.

use futures::future::try_join_all;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info};

use crate::{
    backend::StoreBackend,
    error::{TableLayerError, TableLayerResult},
    registry::SchemaRegistry,
    schema::{PRIMARY_INDEX, TableDefinition},
};

/// Collections owned by the store itself; never dropped.
const SYSTEM_PREFIX: &str = "system.";

/// One index of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRef {
    pub table: String,
    pub index: String,
}

impl IndexRef {
    fn new(table: &str, index: &str) -> Self {
        Self {
            table: table.to_string(),
            index: index.to_string(),
        }
    }
}

/// The create and drop steps separating the store from the registry.
///
/// Returned by [`Reconciler::plan`] as the steps that would run and by
/// [`Reconciler::reconcile`] as the steps that ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaChanges {
    pub created_tables: Vec<String>,
    pub dropped_tables: Vec<String>,
    pub created_indexes: Vec<IndexRef>,
    pub dropped_indexes: Vec<IndexRef>,
}

impl SchemaChanges {
    /// `true` when the store already matches the registry.
    pub fn is_empty(&self) -> bool {
        self.created_tables.is_empty()
            && self.dropped_tables.is_empty()
            && self.created_indexes.is_empty()
            && self.dropped_indexes.is_empty()
    }

    /// Total number of create and drop operations.
    pub fn len(&self) -> usize {
        self.created_tables.len()
            + self.dropped_tables.len()
            + self.created_indexes.len()
            + self.dropped_indexes.len()
    }
}

#[derive(Debug, Clone, Default)]
struct IndexDiff {
    create: Vec<String>,
    drop: Vec<String>,
}

fn failed(action: &str, target: impl Into<String>, err: TableLayerError) -> TableLayerError {
    TableLayerError::Reconciliation {
        action: action.to_string(),
        target: target.into(),
        message: err.to_string(),
    }
}

#[derive(Debug)]
pub struct Reconciler<B: StoreBackend> {
    backend: B,
    registry: Arc<SchemaRegistry>,
}

impl<B: StoreBackend> Reconciler<B> {
    pub fn new(backend: B, registry: impl Into<Arc<SchemaRegistry>>) -> Self {
        Self {
            backend,
            registry: registry.into(),
        }
    }

    async fn live_tables(&self) -> TableLayerResult<HashSet<String>> {
        let tables = self
            .backend
            .list_collections()
            .await
            .map_err(|e| failed("list", "collections", e))?;
        Ok(tables.into_iter().collect())
    }

    fn table_diff(&self, live: &HashSet<String>) -> (Vec<String>, Vec<String>) {
        let declared = self.registry.names().collect::<HashSet<_>>();

        let create = self
            .registry
            .names()
            .filter(|name| !live.contains(*name))
            .map(str::to_string)
            .collect();
        let mut drop = live
            .iter()
            .filter(|name| !declared.contains(name.as_str()) && !name.starts_with(SYSTEM_PREFIX))
            .cloned()
            .collect::<Vec<_>>();
        drop.sort();

        (create, drop)
    }

    async fn index_diff(&self, table: &TableDefinition) -> TableLayerResult<IndexDiff> {
        let live = self
            .backend
            .list_indexes(&table.name)
            .await
            .map_err(|e| failed("list indexes of", table.name.as_str(), e))?;
        let live = live
            .into_iter()
            .filter(|name| name != PRIMARY_INDEX)
            .collect::<Vec<_>>();

        let create = table
            .indexes
            .iter()
            .filter(|index| !live.contains(&index.name))
            .map(|index| index.name.clone())
            .collect();
        let drop = live
            .into_iter()
            .filter(|name| table.index(name).is_none())
            .collect();

        Ok(IndexDiff { create, drop })
    }

    /// Computes the changes [`reconcile`](Self::reconcile) would apply, without applying them.
    pub async fn plan(&self) -> TableLayerResult<SchemaChanges> {
        let live = self.live_tables().await?;
        let (created_tables, dropped_tables) = self.table_diff(&live);

        let mut changes = SchemaChanges {
            created_tables,
            dropped_tables,
            ..Default::default()
        };
        for table in self.registry.tables() {
            let diff = if live.contains(&table.name) {
                self.index_diff(table).await?
            } else {
                IndexDiff {
                    create: table.indexes.iter().map(|index| index.name.clone()).collect(),
                    drop: Vec::new(),
                }
            };
            changes
                .created_indexes
                .extend(diff.create.iter().map(|index| IndexRef::new(&table.name, index)));
            changes
                .dropped_indexes
                .extend(diff.drop.iter().map(|index| IndexRef::new(&table.name, index)));
        }

        Ok(changes)
    }

    /// Brings the store in line with the registry.
    ///
    /// Returns the changes applied; an empty result means the store had already
    /// converged, so a second run right after a first one changes nothing.
    pub async fn reconcile(&self) -> TableLayerResult<SchemaChanges> {
        let live = self.live_tables().await?;
        let (created_tables, dropped_tables) = self.table_diff(&live);

        info!(
            "Reconciling tables: {} to create, {} to drop",
            created_tables.len(),
            dropped_tables.len()
        );
        try_join_all(created_tables.iter().map(|name| async move {
            info!("Creating table: {}", name);
            self.backend
                .create_collection(name)
                .await
                .map_err(|e| failed("create table", name.as_str(), e))
        }))
        .await?;
        try_join_all(dropped_tables.iter().map(|name| async move {
            info!("Dropping table: {}", name);
            self.backend
                .drop_collection(name)
                .await
                .map_err(|e| failed("drop table", name.as_str(), e))
        }))
        .await?;

        let mut changes = SchemaChanges {
            created_tables,
            dropped_tables,
            ..Default::default()
        };
        for table in self.registry.tables() {
            let diff = self.index_diff(table).await?;
            if diff.create.is_empty() && diff.drop.is_empty() {
                debug!("Indexes of {} are up to date", table.name);
                continue;
            }

            let creates = diff.create.iter().map(|name| async move {
                info!("Creating index: {}.{}", table.name, name);
                let target = format!("{}.{}", table.name, name);
                let index = table.index(name).ok_or_else(|| {
                    failed(
                        "create index",
                        target.as_str(),
                        TableLayerError::InvalidDocument("index is not declared".to_string()),
                    )
                })?;
                self.backend
                    .create_index(&table.name, index)
                    .await
                    .map_err(|e| failed("create index", target, e))
            });
            let drops = diff.drop.iter().map(|name| async move {
                info!("Dropping index: {}.{}", table.name, name);
                self.backend
                    .drop_index(&table.name, name)
                    .await
                    .map_err(|e| failed("drop index", format!("{}.{}", table.name, name), e))
            });
            futures::try_join!(try_join_all(creates), try_join_all(drops))?;

            changes
                .created_indexes
                .extend(diff.create.iter().map(|index| IndexRef::new(&table.name, index)));
            changes
                .dropped_indexes
                .extend(diff.drop.iter().map(|index| IndexRef::new(&table.name, index)));
        }

        info!("Reconciliation finished: {} change(s)", changes.len());
        Ok(changes)
    }
}
