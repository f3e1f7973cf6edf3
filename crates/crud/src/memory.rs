use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use shared::{
    domain::{FieldMap, RecordKey},
    error::PersistenceError,
};
use tokio::sync::RwLock;

use crate::{
    adapter::{PersistenceAdapter, Query},
    record::{Record, RecordFactory},
};

/// In-process persistence adapter. Rows are kept as field maps and
/// re-materialised through the factory on every read, like a database would.
pub struct MemoryAdapter<R> {
    factory: Arc<dyn RecordFactory<R>>,
    rows: RwLock<HashMap<RecordKey, FieldMap>>,
    writes: AtomicUsize,
}

impl<R: Record> MemoryAdapter<R> {
    pub fn new(factory: Arc<dyn RecordFactory<R>>) -> Self {
        Self {
            factory,
            rows: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of save and delete calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn materialise(&self, fields: &FieldMap) -> R {
        let mut record = self.factory.new_record();
        record.exchange(fields);
        record
    }

    fn next_key(rows: &HashMap<RecordKey, FieldMap>) -> RecordKey {
        let next = rows
            .keys()
            .filter_map(|key| key.as_str().parse::<i64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        RecordKey::new(next.to_string())
    }
}

#[async_trait]
impl<R: Record> PersistenceAdapter<R> for MemoryAdapter<R> {
    async fn fetch_by_key(&self, key: &RecordKey) -> Result<Option<R>, PersistenceError> {
        let rows = self.rows.read().await;
        Ok(rows.get(key).map(|fields| self.materialise(fields)))
    }

    async fn fetch_all(&self, query: &Query) -> Result<Vec<R>, PersistenceError> {
        let records: Vec<R> = {
            let rows = self.rows.read().await;
            rows.values().map(|fields| self.materialise(fields)).collect()
        };
        Ok(query.apply(records))
    }

    async fn save(&self, record: &mut R) -> Result<RecordKey, PersistenceError> {
        let mut rows = self.rows.write().await;
        let key = match record.key() {
            Some(key) => key,
            None if record.key_fields().len() == 1 => {
                let key = Self::next_key(&rows);
                record.set_key(&key);
                key
            }
            None => return Err(PersistenceError::MissingKey),
        };
        rows.insert(key.clone(), record.to_fields());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), PersistenceError> {
        self.rows.write().await.remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
