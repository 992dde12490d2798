//! Record store contract.
//!
//! The store is an external collaborator: a transactional keyed store
//! with query-by-predicate. The engine only ever performs short
//! read-modify-write transactions scoped to one record, never holding a
//! store lock across a network round-trip.

mod json;
mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use uuid::Uuid;

use crate::error::StoreError;
use crate::record::{ExternalKey, SyncStatus, SyncableRecord};

/// Predicate object for [`RecordStore::query`].
///
/// The default filter returns every non-tombstoned record (the
/// user-facing view).
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to these statuses. When unset, tombstones are excluded
    /// unless `include_tombstoned` is set.
    pub statuses: Option<Vec<SyncStatus>>,
    pub include_tombstoned: bool,
    /// Records holding an external key for this provider.
    pub linked_to: Option<String>,
    /// Records this provider may sync: linked to it, or linked to no
    /// provider at all (eligible to be claimed).
    pub eligible_for: Option<String>,
}

impl RecordFilter {
    /// Records the push phase must consider for the given provider.
    pub fn needs_push(provider: &str) -> Self {
        RecordFilter {
            statuses: Some(vec![SyncStatus::Pending, SyncStatus::Tombstoned]),
            eligible_for: Some(provider.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &SyncableRecord) -> bool {
        match &self.statuses {
            Some(statuses) => {
                if !statuses.contains(&record.status) {
                    return false;
                }
            }
            None => {
                if record.status == SyncStatus::Tombstoned && !self.include_tombstoned {
                    return false;
                }
            }
        }

        if let Some(provider) = &self.linked_to {
            if record.external_key(provider).is_none() {
                return false;
            }
        }

        if let Some(provider) = &self.eligible_for {
            let linked = record.linked_provider();
            if !(linked.is_none() || linked == Some(provider.as_str())) {
                return false;
            }
        }

        true
    }
}

/// Durable keyed storage of syncable records.
///
/// `save` is a transactional upsert; `remove` is the physical purge at
/// the end of the tombstone lifecycle. Implementations must serialize
/// concurrent mutations.
pub trait RecordStore: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Option<SyncableRecord>, StoreError>;

    fn find_by_external_key(
        &self,
        provider: &str,
        key: &ExternalKey,
    ) -> Result<Option<SyncableRecord>, StoreError>;

    /// All records matching the filter, ordered by creation time (ties
    /// broken by id) so that repeated queries are deterministic.
    fn query(&self, filter: &RecordFilter) -> Result<Vec<SyncableRecord>, StoreError>;

    fn save(&self, record: &SyncableRecord) -> Result<(), StoreError>;

    fn remove(&self, id: Uuid) -> Result<(), StoreError>;
}

pub(crate) fn sort_records(records: &mut [SyncableRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
