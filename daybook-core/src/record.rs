//! Provider-neutral record types and the sync status state machine.
//!
//! A [`SyncableRecord`] is the unit of synchronization: an event or a
//! task, plus the bookkeeping the reconciliation engine needs to keep it
//! converged with an external provider. Content fields live in
//! [`RecordContent`] so that remote-wins conflict resolution can replace
//! them wholesale without touching the bookkeeping.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StateError;

/// What kind of item a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Task,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    None,
    Low,
    Medium,
    High,
}

/// Where a record originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Created in this app.
    Local,
    /// Pulled from the named provider link.
    Provider(String),
}

/// A provider-specific identifier that lets the engine find a record on
/// the remote system again (item id plus, where relevant, the parent
/// calendar/collection id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalKey {
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
}

impl ExternalKey {
    pub fn new(item_id: impl Into<String>) -> Self {
        ExternalKey {
            item_id: item_id.into(),
            collection_id: None,
        }
    }

    pub fn in_collection(item_id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        ExternalKey {
            item_id: item_id.into(),
            collection_id: Some(collection_id.into()),
        }
    }
}

impl fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.collection_id {
            Some(c) => write!(f, "{}@{}", self.item_id, c),
            None => write!(f, "{}", self.item_id),
        }
    }
}

/// Sync lifecycle of a record.
///
/// One tagged state instead of a deleted-flag plus a status field, so
/// that combinations like "deleted but synced" are unrepresentable.
/// Physical purge is removal from the store, not a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local change not yet reflected on any linked provider.
    Pending,
    /// In agreement with the linked provider.
    Synced,
    /// User opted this record out of sync.
    LocalOnly,
    /// Deleted locally; retained until the deletion has propagated to
    /// every linked provider, then physically purged.
    Tombstoned,
}

impl SyncStatus {
    /// Whether this record carries a local change the push phase must
    /// propagate.
    pub fn is_locally_dirty(self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Tombstoned)
    }
}

/// The user-visible fields of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordContent {
    pub kind: ItemKind,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub notes: Option<String>,
    pub completed: bool,
    pub category: String,
    pub reminder_minutes: Option<i64>,
    /// Opaque recurrence payload; never interpreted by the core.
    pub recurrence: Option<Vec<u8>>,
    pub location: Option<String>,
    pub priority: Priority,
}

impl RecordContent {
    pub fn task(title: impl Into<String>, start: DateTime<Utc>) -> Self {
        RecordContent {
            kind: ItemKind::Task,
            title: title.into(),
            start,
            end: None,
            all_day: false,
            notes: None,
            completed: false,
            category: "other".to_string(),
            reminder_minutes: None,
            recurrence: None,
            location: None,
            priority: Priority::None,
        }
    }

    pub fn event(title: impl Into<String>, start: DateTime<Utc>) -> Self {
        RecordContent {
            kind: ItemKind::Event,
            ..Self::task(title, start)
        }
    }
}

/// The unit of synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncableRecord {
    pub id: Uuid,
    pub content: RecordContent,
    /// Provider name → external key. At most one entry at a time
    /// (single-provider authority), enforced by [`link_external_key`].
    ///
    /// [`link_external_key`]: SyncableRecord::link_external_key
    #[serde(default)]
    pub external_keys: BTreeMap<String, ExternalKey>,
    pub source: Source,
    pub status: SyncStatus,
    /// Strictly increasing on every local mutation; the tie-breaker
    /// input for last-writer-wins conflict resolution.
    pub last_modified_local: DateTime<Utc>,
    /// Set only when a remote pull produces or confirms the record.
    pub last_modified_remote: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Permanent per-record rejection from a provider. While set, the
    /// push phase skips the record; cleared by the next local edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

impl SyncableRecord {
    /// A new locally-created record, pending its first push.
    pub fn new_local(content: RecordContent) -> Self {
        let now = Utc::now();
        SyncableRecord {
            id: Uuid::new_v4(),
            content,
            external_keys: BTreeMap::new(),
            source: Source::Local,
            status: SyncStatus::Pending,
            last_modified_local: now,
            last_modified_remote: None,
            created_at: now,
            sync_error: None,
        }
    }

    /// A record created from a provider pull, already in agreement with
    /// the remote.
    pub fn from_remote(
        provider: &str,
        key: ExternalKey,
        content: RecordContent,
        remote_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        let mut external_keys = BTreeMap::new();
        external_keys.insert(provider.to_string(), key);
        SyncableRecord {
            id: Uuid::new_v4(),
            content,
            external_keys,
            source: Source::Provider(provider.to_string()),
            status: SyncStatus::Synced,
            last_modified_local: now,
            last_modified_remote: Some(remote_time),
            created_at: now,
            sync_error: None,
        }
    }

    pub fn external_key(&self, provider: &str) -> Option<&ExternalKey> {
        self.external_keys.get(provider)
    }

    /// The provider currently holding authority over this record, if any.
    pub fn linked_provider(&self) -> Option<&str> {
        self.external_keys.keys().next().map(String::as_str)
    }

    /// Link this record to a provider's external key.
    ///
    /// At most one provider may hold a key at a time; re-linking the
    /// same provider replaces its key.
    pub fn link_external_key(
        &mut self,
        provider: &str,
        key: ExternalKey,
    ) -> Result<(), StateError> {
        if let Some(linked) = self.linked_provider() {
            if linked != provider {
                return Err(StateError::AlreadyLinked(linked.to_string()));
            }
        }
        self.external_keys.insert(provider.to_string(), key);
        Ok(())
    }

    pub fn clear_external_key(&mut self, provider: &str) {
        self.external_keys.remove(provider);
    }

    /// Stamp a local mutation.
    ///
    /// `last_modified_local` must strictly increase even when two edits
    /// land within clock resolution, so the stamp never moves backwards
    /// and always advances by at least a millisecond.
    fn touch_local(&mut self) {
        let floor = self.last_modified_local + Duration::milliseconds(1);
        let now = Utc::now();
        self.last_modified_local = if now > floor { now } else { floor };
    }

    /// Local mutation: the record needs to be pushed again.
    ///
    /// A `LocalOnly` record stays local-only; the edit is stamped but
    /// nothing will be pushed. Clears any previous provider rejection.
    pub fn mark_pending(&mut self) {
        self.touch_local();
        self.sync_error = None;
        if self.status != SyncStatus::LocalOnly {
            self.status = SyncStatus::Pending;
        }
    }

    /// Successful push, or a pull that confirmed the record.
    pub fn mark_synced(&mut self, remote_time: DateTime<Utc>) {
        self.status = SyncStatus::Synced;
        self.last_modified_remote = Some(remote_time);
    }

    /// Local delete: keep the record as a tombstone until every linked
    /// provider has confirmed the deletion.
    pub fn mark_tombstoned(&mut self) {
        self.touch_local();
        self.status = SyncStatus::Tombstoned;
    }

    /// Opt this record out of sync. Severs provider authority: any
    /// external key is dropped, so a later remote change for the old key
    /// is treated as a fresh remote record.
    pub fn mark_local_only(&mut self) {
        self.touch_local();
        self.external_keys.clear();
        self.status = SyncStatus::LocalOnly;
    }

    /// Re-enable sync for a `LocalOnly` record.
    pub fn enable_sync(&mut self) {
        if self.status == SyncStatus::LocalOnly {
            self.touch_local();
            self.status = SyncStatus::Pending;
        }
    }
}
