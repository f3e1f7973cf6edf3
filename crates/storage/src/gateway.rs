use std::sync::Arc;

use async_trait::async_trait;
use crud::{
    adapter::{PersistenceAdapter, Query},
    record::{Record, RecordFactory},
};
use shared::{
    domain::{FieldMap, Page, PageRequest, RecordKey},
    error::PersistenceError,
};
use tracing::debug;

use crate::Storage;

/// Table-gateway adapter: every call goes straight to SQL, and list pages are
/// counted and offset in the database.
pub struct TableGateway<R> {
    storage: Storage,
    resource: String,
    factory: Arc<dyn RecordFactory<R>>,
    base_query: Query,
}

impl<R: Record> TableGateway<R> {
    pub fn new(
        storage: Storage,
        resource: impl Into<String>,
        factory: Arc<dyn RecordFactory<R>>,
    ) -> Self {
        Self {
            storage,
            resource: resource.into(),
            factory,
            base_query: Query::all(),
        }
    }

    /// Query used by list views when the caller passes none.
    pub fn with_base_query(mut self, query: Query) -> Self {
        self.base_query = query;
        self
    }

    fn materialise(&self, fields: &FieldMap) -> R {
        let mut record = self.factory.new_record();
        record.exchange(fields);
        record
    }
}

#[async_trait]
impl<R: Record> PersistenceAdapter<R> for TableGateway<R> {
    fn default_query(&self) -> Query {
        self.base_query.clone()
    }

    async fn fetch_by_key(&self, key: &RecordKey) -> Result<Option<R>, PersistenceError> {
        let row = self
            .storage
            .load_row(&self.resource, key)
            .await
            .map_err(PersistenceError::backend)?;
        Ok(row.map(|row| self.materialise(&row.fields)))
    }

    async fn fetch_all(&self, query: &Query) -> Result<Vec<R>, PersistenceError> {
        let rows = self
            .storage
            .select_rows(&self.resource, query, None, 0)
            .await
            .map_err(PersistenceError::backend)?;
        Ok(rows.iter().map(|row| self.materialise(&row.fields)).collect())
    }

    async fn fetch_page(
        &self,
        query: &Query,
        request: PageRequest,
    ) -> Result<Page<R>, PersistenceError> {
        let total = self
            .storage
            .count_rows(&self.resource, query)
            .await
            .map_err(PersistenceError::backend)?;
        let request = request.normalized(total);
        let rows = self
            .storage
            .select_rows(&self.resource, query, Some(request.size()), request.offset())
            .await
            .map_err(PersistenceError::backend)?;
        let items = rows.iter().map(|row| self.materialise(&row.fields)).collect();
        Ok(Page::new(items, total, request))
    }

    async fn save(&self, record: &mut R) -> Result<RecordKey, PersistenceError> {
        let key = match (record.key(), record.key_fields()) {
            (Some(key), _) => {
                self.storage
                    .upsert_row(&self.resource, &key, &record.to_fields())
                    .await
                    .map_err(PersistenceError::backend)?;
                key
            }
            (None, [key_field]) => {
                let key = self
                    .storage
                    .insert_next(&self.resource, key_field, &record.to_fields())
                    .await
                    .map_err(PersistenceError::backend)?;
                record.set_key(&key);
                key
            }
            (None, _) => return Err(PersistenceError::MissingKey),
        };
        debug!(resource = %self.resource, %key, "row saved");
        Ok(key)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), PersistenceError> {
        let removed = self
            .storage
            .delete_row(&self.resource, key)
            .await
            .map_err(PersistenceError::backend)?;
        debug!(resource = %self.resource, %key, removed, "row deleted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
