//! Record operations on one declared table.
//!
//! A [`Table`] handle is obtained from [`QueryEngine::table`](crate::engine::QueryEngine::table)
//! and binds a [`TableDefinition`] to the engine's backend. Every write goes
//! through the same pipeline:
//!
//! 1. native dates in the payload are normalized to ISO-8601 strings,
//! 2. audit timestamps are stamped,
//! 3. the record is validated for the operation (which also encodes identifiers),
//! 4. the backend write is issued,
//! 5. the stored shape is returned in wire form (`id` as a string).
//!
//! Batch forms validate every element before the single bulk write, so a bad
//! element aborts the batch with nothing written.

use std::collections::HashMap;

use bson::{Bson, Document, oid::ObjectId};
use futures::try_join;
use tracing::{debug, warn};

use crate::{
    backend::StoreBackend,
    codec::{normalize_dates, now, to_native_id, to_wire},
    engine::EngineOptions,
    error::{TableLayerError, TableLayerResult},
    page::{Filtered, Pagination},
    query::{Expr, Filter, Query, Sort, SortDirection},
    record::{Record, project},
    schema::{CREATED_DATE_FIELD, ID_FIELD, STORAGE_ID_FIELD, TableDefinition, UPDATED_DATE_FIELD},
    validator::{Operation, Validator},
};

/// Per-call options of [`Table::filter`].
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Fields to return; empty returns every field.
    pub fields: Vec<String>,
    /// Sort keys in priority order; empty uses the engine's default sort.
    pub sort: Vec<Sort>,
    /// Full-text search term, combined with the criteria.
    pub search: Option<String>,
    pub pagination: Option<Pagination>,
}

impl FilterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort::new(field, direction));
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Requests the zero-indexed page `page` of `size` records.
    pub fn paginate(mut self, page: usize, size: usize) -> Self {
        self.pagination = Some(Pagination::new(page, size));
        self
    }
}

#[derive(Debug)]
pub struct Table<'a, B: StoreBackend> {
    definition: &'a TableDefinition,
    backend: &'a B,
    options: &'a EngineOptions,
}

impl<'a, B: StoreBackend> Table<'a, B> {
    pub(crate) fn new(definition: &'a TableDefinition, backend: &'a B, options: &'a EngineOptions) -> Self {
        Self {
            definition,
            backend,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &TableDefinition {
        self.definition
    }

    fn validator(&self) -> Validator<'a> {
        Validator::for_table(self.definition, &self.options.identifiers)
    }

    /// Translates caller criteria (string ids, native dates) into a backend filter.
    fn criteria(&self, criteria: Document) -> TableLayerResult<Option<Expr>> {
        let criteria = self
            .options
            .identifiers
            .translate_filter(normalize_dates(criteria))?;
        Expr::from_criteria(&criteria)
    }

    /// Fetches one record by identifier.
    ///
    /// Absence is not an error: a missing record yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`TableLayerError::InvalidIdentifier`] if `id` is malformed.
    pub async fn find(&self, id: &str, fields: &[&str]) -> TableLayerResult<Option<Record>> {
        let id = to_native_id(id)?;
        let query = Query::builder()
            .filter(Filter::eq(STORAGE_ID_FIELD, id))
            .project(fields.iter().copied())
            .limit(1)
            .build();

        debug!("find {} in {}", id, self.name());
        let documents = self.backend.query_documents(query, self.name()).await?;

        Ok(documents.into_iter().next().map(surface))
    }

    /// Fetches the first record whose `field` equals `value`.
    ///
    /// `value` goes through the same translation as filter criteria, so a
    /// string value of an identifier field is matched in native form.
    pub async fn find_by(&self, field: &str, value: impl Into<Bson>, fields: &[&str]) -> TableLayerResult<Option<Record>> {
        let mut criteria = Document::new();
        criteria.insert(field, value.into());
        let query = Query::builder()
            .filter_opt(self.criteria(criteria)?)
            .project(fields.iter().copied())
            .limit(1)
            .build();

        debug!("find by {} in {}", field, self.name());
        let documents = self.backend.query_documents(query, self.name()).await?;

        Ok(documents.into_iter().next().map(surface))
    }

    /// Returns the records matching `criteria`.
    ///
    /// Criteria identifiers are given as strings and translated to native form.
    /// When `options.pagination` is set the result is [`Filtered::Paged`] and its
    /// `count` covers the full criteria, otherwise [`Filtered::All`].
    pub async fn filter(&self, criteria: Document, options: FilterOptions) -> TableLayerResult<Filtered> {
        let mut filter = self.criteria(criteria)?;
        if let Some(term) = options.search {
            filter = Some(match filter {
                Some(expr) => expr.and(Filter::text(term)),
                None => Filter::text(term),
            });
        }

        let sort = if options.sort.is_empty() {
            vec![self.options.default_sort.clone()]
        } else {
            options.sort
        };
        let mut query = Query::builder()
            .filter_opt(filter.clone())
            .project(options.fields)
            .sorts(sort.into_iter().map(|sort| self.options.effective_sort(sort)));

        debug!("filter {} (paged: {})", self.name(), options.pagination.is_some());
        match options.pagination {
            Some(pagination) if pagination.size == 0 => {
                let count = self.backend.count_documents(filter, self.name()).await?;

                Ok(Filtered::Paged(pagination.page(Vec::new(), count as usize)))
            }
            Some(pagination) => {
                query = query.offset(pagination.offset()).limit(pagination.size);
                let (documents, count) = try_join!(
                    self.backend.query_documents(query.build(), self.name()),
                    self.backend.count_documents(filter, self.name()),
                )?;
                let data = documents.into_iter().map(surface).collect();

                Ok(Filtered::Paged(pagination.page(data, count as usize)))
            }
            None => {
                let documents = self
                    .backend
                    .query_documents(query.build(), self.name())
                    .await?;

                Ok(Filtered::All(documents.into_iter().map(surface).collect()))
            }
        }
    }

    /// Counts the records matching `criteria`.
    pub async fn count(&self, criteria: Document) -> TableLayerResult<u64> {
        let filter = self.criteria(criteria)?;
        self.backend.count_documents(filter, self.name()).await
    }

    /// Validates a new record and gives it a fresh identifier.
    fn prepare_insert(&self, record: Record, now: &str) -> TableLayerResult<Record> {
        let mut record = normalize_dates(record);
        record.remove(ID_FIELD);
        record.remove(STORAGE_ID_FIELD);
        if !record.contains_key(CREATED_DATE_FIELD) {
            record.insert(CREATED_DATE_FIELD, now);
        }
        record.insert(UPDATED_DATE_FIELD, now);

        let validated = self.validator().validate(record, Operation::Create)?;
        Ok(with_storage_id(ObjectId::new(), validated))
    }

    /// Inserts one record and returns its stored shape.
    ///
    /// Any identifier in `record` is ignored; a fresh one is assigned.
    pub async fn insert(&self, record: Record, fields: &[&str]) -> TableLayerResult<Record> {
        let mut inserted = self.insert_many(vec![record], fields).await?;
        inserted
            .pop()
            .ok_or_else(|| TableLayerError::Backend("insert returned no record".to_string()))
    }

    /// Inserts records as one bulk write.
    ///
    /// Every record is validated before anything is written; the first invalid
    /// record fails the call. If the backend applies the bulk write
    /// non-atomically, a store failure partway leaves earlier records written.
    pub async fn insert_many(&self, records: Vec<Record>, fields: &[&str]) -> TableLayerResult<Vec<Record>> {
        let now = now();
        let stored = records
            .into_iter()
            .map(|record| self.prepare_insert(record, &now))
            .collect::<TableLayerResult<Vec<_>>>()?;
        if stored.is_empty() {
            return Ok(Vec::new());
        }

        debug!("insert {} record(s) into {}", stored.len(), self.name());
        self.backend
            .insert_documents(stored.clone(), self.name())
            .await?;

        Ok(stored
            .into_iter()
            .map(|record| project(surface(record), fields))
            .collect())
    }

    /// Validates a record for replace-or-create, keeping its identifier if it has one.
    ///
    /// The flag is set when `created_date` was stamped here rather than supplied.
    fn prepare_upsert(&self, record: Record, now: &str) -> TableLayerResult<(ObjectId, Record, bool)> {
        let mut record = normalize_dates(record);
        let id = match record.remove(ID_FIELD).or_else(|| record.remove(STORAGE_ID_FIELD)) {
            Some(Bson::String(id)) => to_native_id(&id)?,
            Some(Bson::ObjectId(id)) => id,
            Some(other) => return Err(TableLayerError::InvalidIdentifier(other.to_string())),
            None => ObjectId::new(),
        };
        let stamped = !record.contains_key(CREATED_DATE_FIELD);
        if stamped {
            record.insert(CREATED_DATE_FIELD, now);
        }
        record.insert(UPDATED_DATE_FIELD, now);

        let validated = self.validator().validate(record, Operation::Create)?;
        Ok((id, with_storage_id(id, validated), stamped))
    }

    /// Looks up the stored `created_date` of the records that already exist.
    async fn created_dates(&self, ids: Vec<ObjectId>) -> TableLayerResult<HashMap<ObjectId, Bson>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = Query::builder()
            .filter(Filter::any_of(STORAGE_ID_FIELD, ids))
            .project([STORAGE_ID_FIELD, CREATED_DATE_FIELD])
            .build();

        Ok(self
            .backend
            .query_documents(query, self.name())
            .await?
            .into_iter()
            .filter_map(|mut document| match (
                document.remove(STORAGE_ID_FIELD),
                document.remove(CREATED_DATE_FIELD),
            ) {
                (Some(Bson::ObjectId(id)), Some(created)) => Some((id, created)),
                _ => None,
            })
            .collect())
    }

    /// Replaces the record with the same identifier, or creates it.
    ///
    /// Validation follows creation rules. A replaced record keeps its stored
    /// `created_date` unless `record` supplies one. Used for idempotent bulk loads.
    pub async fn upsert(&self, record: Record, fields: &[&str]) -> TableLayerResult<Record> {
        let mut upserted = self.upsert_many(vec![record], fields).await?;
        upserted
            .pop()
            .ok_or_else(|| TableLayerError::Backend("upsert returned no record".to_string()))
    }

    pub async fn upsert_many(&self, records: Vec<Record>, fields: &[&str]) -> TableLayerResult<Vec<Record>> {
        let now = now();
        let prepared = records
            .into_iter()
            .map(|record| self.prepare_upsert(record, &now))
            .collect::<TableLayerResult<Vec<_>>>()?;
        if prepared.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self
            .created_dates(
                prepared
                    .iter()
                    .filter(|(_, _, stamped)| *stamped)
                    .map(|(id, _, _)| *id)
                    .collect(),
            )
            .await?;
        let prepared = prepared
            .into_iter()
            .map(|(id, mut record, _)| {
                if let Some(created) = existing.get(&id) {
                    record.insert(CREATED_DATE_FIELD, created.clone());
                }
                (id, record)
            })
            .collect::<Vec<_>>();

        debug!("upsert {} record(s) into {}", prepared.len(), self.name());
        self.backend
            .upsert_documents(prepared.clone(), self.name())
            .await?;

        Ok(prepared
            .into_iter()
            .map(|(_, record)| project(surface(record), fields))
            .collect())
    }

    /// Validates a partial update and splits off its identifier.
    fn prepare_update(&self, record: Record, now: &str) -> TableLayerResult<(ObjectId, Record)> {
        let mut record = normalize_dates(record);
        record.remove(CREATED_DATE_FIELD);
        record.insert(UPDATED_DATE_FIELD, now);

        let mut patch = self.validator().validate(record, Operation::UpdateById)?;
        let id = match patch.remove(ID_FIELD) {
            Some(Bson::String(id)) => to_native_id(&id)?,
            Some(Bson::ObjectId(id)) => id,
            _ => return Err(TableLayerError::validation(ID_FIELD, "is required")),
        };
        Ok((id, patch))
    }

    /// Sets the supplied fields on the record named by `record.id`.
    ///
    /// Fields not present in `record` are left untouched and `created_date` is
    /// never changed. Returns the applied patch with its identifier.
    pub async fn update_by_id(&self, record: Record, fields: &[&str]) -> TableLayerResult<Record> {
        let mut updated = self.update_many_by_id(vec![record], fields).await?;
        updated
            .pop()
            .ok_or_else(|| TableLayerError::Backend("update returned no record".to_string()))
    }

    pub async fn update_many_by_id(&self, records: Vec<Record>, fields: &[&str]) -> TableLayerResult<Vec<Record>> {
        let now = now();
        let patches = records
            .into_iter()
            .map(|record| self.prepare_update(record, &now))
            .collect::<TableLayerResult<Vec<_>>>()?;
        if patches.is_empty() {
            return Ok(Vec::new());
        }

        debug!("update {} record(s) in {}", patches.len(), self.name());
        self.backend
            .update_documents(patches.clone(), self.name())
            .await?;

        Ok(patches
            .into_iter()
            .map(|(id, patch)| project(surface(with_storage_id(id, patch)), fields))
            .collect())
    }

    /// Applies `patch` to every record matching `criteria`.
    ///
    /// Only the fields present in the patch are checked. Empty criteria match
    /// every record. Returns the number of records matched.
    pub async fn update_by_filter(&self, patch: Record, criteria: Document) -> TableLayerResult<u64> {
        let mut patch = normalize_dates(patch);
        patch.remove(CREATED_DATE_FIELD);
        patch.insert(UPDATED_DATE_FIELD, now());

        let mut patch = self.validator().validate(patch, Operation::UpdateByFilter)?;
        patch.remove(ID_FIELD);
        let filter = self.criteria(criteria)?;

        debug!("update {} by filter", self.name());
        self.backend
            .update_matching(filter, patch, self.name())
            .await
    }

    /// Hard-deletes one record. Returns the identifier given.
    pub async fn delete_by_id(&self, id: &str) -> TableLayerResult<String> {
        let mut deleted = self.delete_by_ids(vec![id.to_string()]).await?;
        deleted
            .pop()
            .ok_or_else(|| TableLayerError::Backend("delete returned no identifier".to_string()))
    }

    /// Hard-deletes records by identifier.
    ///
    /// Every identifier is parsed before the store is touched. The identifiers
    /// are returned as given, whether or not each record existed.
    pub async fn delete_by_ids(&self, ids: Vec<String>) -> TableLayerResult<Vec<String>> {
        let native = ids
            .iter()
            .map(|id| to_native_id(id))
            .collect::<TableLayerResult<Vec<_>>>()?;
        if native.is_empty() {
            return Ok(ids);
        }

        debug!("delete {} record(s) from {}", native.len(), self.name());
        self.backend
            .delete_documents(native, self.name())
            .await?;

        Ok(ids)
    }

    /// Hard-deletes every record matching `criteria`.
    ///
    /// Criteria that match every record are refused: nothing is deleted and
    /// `Ok(0)` is returned.
    pub async fn delete_by_filter(&self, criteria: Document) -> TableLayerResult<u64> {
        let filter = match self.criteria(criteria)? {
            Some(filter) if !filter.matches_everything() => filter,
            _ => {
                warn!("Refusing to delete every record of {}: criteria match everything", self.name());
                return Ok(0);
            }
        };

        debug!("delete from {} by filter", self.name());
        self.backend.delete_matching(filter, self.name()).await
    }
}

/// Prepends the storage identifier to a validated record.
fn with_storage_id(id: ObjectId, record: Record) -> Document {
    let mut stored = Document::new();
    stored.insert(STORAGE_ID_FIELD, id);
    stored.extend(record);
    stored
}

/// Converts a stored document into the shape returned to callers.
fn surface(document: Document) -> Record {
    normalize_dates(to_wire(document))
}
