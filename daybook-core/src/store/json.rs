//! JSON-file record store.
//!
//! A single JSON document holding every record, rewritten atomically
//! (temp file + rename) on each mutation. Suitable for the CLI's store
//! sizes; the engine only requires the [`RecordStore`] contract, so a
//! database-backed store can be swapped in without touching the engine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{ExternalKey, SyncableRecord};
use crate::store::{sort_records, RecordFilter, RecordStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    records: Vec<SyncableRecord>,
}

#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    records: Mutex<HashMap<Uuid, SyncableRecord>>,
}

impl JsonStore {
    /// Open the store at `path`, creating parent directories as needed.
    /// A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let records = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&contents)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
            file.records.into_iter().map(|r| (r.id, r)).collect()
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), "opened record store");
        Ok(JsonStore {
            path,
            records: Mutex::new(records),
        })
    }

    /// Default store location: `<data_dir>/daybook/records.json`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            StoreError::Corrupt("could not determine data directory".to_string())
        })?;
        Ok(data_dir.join("daybook").join("records.json"))
    }

    /// Write the full record set atomically: temp file first, then
    /// rename over the real path (rename is atomic on the same
    /// filesystem).
    fn persist(&self, records: &HashMap<Uuid, SyncableRecord>) -> Result<(), StoreError> {
        let mut all: Vec<SyncableRecord> = records.values().cloned().collect();
        sort_records(&mut all);

        let contents = serde_json::to_string_pretty(&StoreFile { records: all })
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl RecordStore for JsonStore {
    fn get(&self, id: Uuid) -> Result<Option<SyncableRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&id).cloned())
    }

    fn find_by_external_key(
        &self,
        provider: &str,
        key: &ExternalKey,
    ) -> Result<Option<SyncableRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .values()
            .find(|r| r.external_key(provider) == Some(key))
            .cloned())
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<SyncableRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut matched: Vec<SyncableRecord> =
            records.values().filter(|r| filter.matches(r)).cloned().collect();
        sort_records(&mut matched);
        Ok(matched)
    }

    fn save(&self, record: &SyncableRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let previous = records.insert(record.id, record.clone());
        if let Err(e) = self.persist(&records) {
            // Roll the in-memory state back so a failed write is not
            // observable as a committed transaction.
            match previous {
                Some(prev) => records.insert(record.id, prev),
                None => records.remove(&record.id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let previous = records.remove(&id);
        if let Err(e) = self.persist(&records) {
            if let Some(prev) = previous {
                records.insert(id, prev);
            }
            return Err(e);
        }
        Ok(())
    }
}
