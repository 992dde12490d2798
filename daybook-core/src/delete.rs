//! User-initiated deletion.
//!
//! Deleting a record is one logical unit of work: cancel any scheduled
//! notification, tombstone (or purge) the record, persist, then signal
//! the change exactly once. If persistence fails the caller sees the
//! error and no signal is emitted.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::notify::ChangeNotifier;
use crate::record::SyncableRecord;
use crate::store::RecordStore;

/// Contract with the local-notification collaborator.
///
/// `cancel_notification` always succeeds: cancelling something that was
/// never scheduled is a silent no-op, so there is no error channel.
/// `schedule_notification` is invoked by collaborators outside this core
/// when a record's reminder fields change, never by the sync engine.
pub trait NotificationGate: Send + Sync {
    fn cancel_notification(&self, record_id: Uuid);
    fn schedule_notification(&self, record: &SyncableRecord);
}

/// A gate for embeddings without local notifications.
pub struct NoopGate;

impl NotificationGate for NoopGate {
    fn cancel_notification(&self, _record_id: Uuid) {}
    fn schedule_notification(&self, _record: &SyncableRecord) {}
}

pub struct DeletionCoordinator {
    store: Arc<dyn RecordStore>,
    notifications: Arc<dyn NotificationGate>,
    notifier: ChangeNotifier,
}

impl DeletionCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifications: Arc<dyn NotificationGate>,
        notifier: ChangeNotifier,
    ) -> Self {
        DeletionCoordinator {
            store,
            notifications,
            notifier,
        }
    }

    /// Delete a record.
    ///
    /// A record with no external key (never pushed, or local-only) is
    /// purged immediately without any provider involvement; a linked
    /// record becomes a tombstone for the next sync pass to propagate.
    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let Some(mut record) = self.store.get(id)? else {
            return Err(StoreError::NotFound(id));
        };

        // Fire-and-forget: never fails the deletion.
        self.notifications.cancel_notification(id);

        if record.external_keys.is_empty() {
            debug!(record = %id, "purging unlinked record");
            self.store.remove(id)?;
        } else {
            debug!(record = %id, "tombstoning linked record");
            record.mark_tombstoned();
            self.store.save(&record)?;
        }

        // Exactly once, only after the transaction committed.
        self.notifier.notify();
        Ok(())
    }
}
