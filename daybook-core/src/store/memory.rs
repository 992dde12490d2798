//! In-memory record store.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{ExternalKey, SyncableRecord};
use crate::store::{sort_records, RecordFilter, RecordStore};

/// RwLock'd map store. The default store for tests and for embedding
/// the engine without a durable backend.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, SyncableRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: Uuid) -> Result<Option<SyncableRecord>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&id).cloned())
    }

    fn find_by_external_key(
        &self,
        provider: &str,
        key: &ExternalKey,
    ) -> Result<Option<SyncableRecord>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .values()
            .find(|r| r.external_key(provider) == Some(key))
            .cloned())
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<SyncableRecord>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut matched: Vec<SyncableRecord> =
            records.values().filter(|r| filter.matches(r)).cloned().collect();
        sort_records(&mut matched);
        Ok(matched)
    }

    fn save(&self, record: &SyncableRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.id, record.clone());
        Ok(())
    }

    fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.remove(&id);
        Ok(())
    }
}
