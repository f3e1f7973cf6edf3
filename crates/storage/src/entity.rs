use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use crud::{
    adapter::{PersistenceAdapter, Query},
    record::{Record, RecordFactory},
};
use shared::{
    domain::{FieldMap, RecordKey},
    error::PersistenceError,
};
use tracing::{debug, info};

use crate::{RowChange, Storage, StoredRow};

/// Entry point over [`Storage`]: reads go straight to the database, writes
/// are collected in a [`UnitOfWork`] per operation.
pub struct EntityManager {
    storage: Storage,
}

impl EntityManager {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn find(&self, resource: &str, key: &RecordKey) -> Result<Option<StoredRow>> {
        self.storage.load_row(resource, key).await
    }

    pub fn unit_of_work(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            storage: &self.storage,
            queued: Vec::new(),
        }
    }
}

/// Queued changes of one operation. `flush` consumes the unit, so a failed
/// flush leaves nothing behind for later writes.
pub struct UnitOfWork<'a> {
    storage: &'a Storage,
    queued: Vec<RowChange>,
}

impl UnitOfWork<'_> {
    pub fn persist(&mut self, resource: &str, key: RecordKey, fields: FieldMap) {
        self.queued.push(RowChange::Upsert {
            resource: resource.to_string(),
            key,
            fields,
        });
    }

    /// Queues a new row whose key is assigned at flush time.
    pub fn insert(&mut self, resource: &str, key_field: &str, fields: FieldMap) {
        self.queued.push(RowChange::Insert {
            resource: resource.to_string(),
            key_field: key_field.to_string(),
            fields,
        });
    }

    pub fn remove(&mut self, resource: &str, key: RecordKey) {
        self.queued.push(RowChange::Delete {
            resource: resource.to_string(),
            key,
        });
    }

    pub fn pending_changes(&self) -> usize {
        self.queued.len()
    }

    /// Writes every queued change in one transaction and returns the keys
    /// assigned to inserts, in queue order.
    pub async fn flush(self) -> Result<Vec<RecordKey>> {
        if self.queued.is_empty() {
            return Ok(Vec::new());
        }
        let assigned = self.storage.apply_changes(&self.queued).await?;
        debug!(flushed = self.queued.len(), "unit of work flushed");
        Ok(assigned)
    }
}

/// Repository adapter over an [`EntityManager`]. Lists are loaded whole and
/// paginated in memory; saves merge the validated fields into the stored
/// entity before flushing.
pub struct EntityRepository<R> {
    manager: Arc<EntityManager>,
    resource: String,
    factory: Arc<dyn RecordFactory<R>>,
    base_query: Query,
}

impl<R: Record> EntityRepository<R> {
    pub fn new(
        manager: Arc<EntityManager>,
        resource: impl Into<String>,
        factory: Arc<dyn RecordFactory<R>>,
    ) -> Self {
        Self {
            manager,
            resource: resource.into(),
            factory,
            base_query: Query::all(),
        }
    }

    pub fn with_base_query(mut self, query: Query) -> Self {
        self.base_query = query;
        self
    }

    pub async fn find(&self, key: &RecordKey) -> Result<Option<R>> {
        let row = self.manager.find(&self.resource, key).await?;
        Ok(row.map(|row| self.materialise(&row.fields)))
    }

    pub async fn find_all(&self, query: &Query) -> Result<Vec<R>> {
        let rows = self
            .manager
            .storage()
            .select_rows(&self.resource, query, None, 0)
            .await?;
        Ok(rows.iter().map(|row| self.materialise(&row.fields)).collect())
    }

    fn materialise(&self, fields: &FieldMap) -> R {
        let mut record = self.factory.new_record();
        record.exchange(fields);
        record
    }

    /// Fields of `record` that its input filter declares, plus its key.
    fn declared_fields(record: &R) -> FieldMap {
        let filter = record.input_filter();
        let keys = record.key_fields();
        record
            .to_fields()
            .into_iter()
            .filter(|(name, _)| keys.contains(&name.as_str()) || filter.get(name).is_some())
            .collect()
    }
}

#[async_trait]
impl<R: Record> PersistenceAdapter<R> for EntityRepository<R> {
    fn default_query(&self) -> Query {
        self.base_query.clone()
    }

    async fn fetch_by_key(&self, key: &RecordKey) -> Result<Option<R>, PersistenceError> {
        self.find(key).await.map_err(PersistenceError::backend)
    }

    async fn fetch_all(&self, query: &Query) -> Result<Vec<R>, PersistenceError> {
        self.find_all(query).await.map_err(PersistenceError::backend)
    }

    async fn save(&self, record: &mut R) -> Result<RecordKey, PersistenceError> {
        let mut unit = self.manager.unit_of_work();
        let known = match (record.key(), record.key_fields()) {
            (Some(key), _) => {
                let existing = self
                    .manager
                    .find(&self.resource, &key)
                    .await
                    .map_err(PersistenceError::backend)?;
                let fields = match existing {
                    Some(row) => {
                        let mut merged = row.fields;
                        merged.extend(Self::declared_fields(record));
                        record.exchange(&merged);
                        merged
                    }
                    None => record.to_fields(),
                };
                unit.persist(&self.resource, key.clone(), fields);
                Some(key)
            }
            (None, [key_field]) => {
                unit.insert(&self.resource, key_field, record.to_fields());
                None
            }
            (None, _) => return Err(PersistenceError::MissingKey),
        };

        let assigned = unit.flush().await.map_err(PersistenceError::backend)?;
        let key = match known {
            Some(key) => key,
            None => {
                let key = assigned
                    .into_iter()
                    .next()
                    .ok_or_else(|| PersistenceError::backend("insert assigned no key"))?;
                record.set_key(&key);
                key
            }
        };
        info!(resource = %self.resource, %key, "entity persisted");
        Ok(key)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), PersistenceError> {
        let existing = self
            .manager
            .find(&self.resource, key)
            .await
            .map_err(PersistenceError::backend)?;
        if existing.is_none() {
            debug!(resource = %self.resource, %key, "nothing to remove");
            return Ok(());
        }
        let mut unit = self.manager.unit_of_work();
        unit.remove(&self.resource, key.clone());
        unit.flush().await.map_err(PersistenceError::backend)?;
        info!(resource = %self.resource, %key, "entity removed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/entity_tests.rs"]
mod tests;
