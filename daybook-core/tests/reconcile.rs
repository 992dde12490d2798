//! Reconciliation engine scenarios: idempotence, conflict tie-breaks,
//! deletion propagation, error isolation, watermark rules.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use daybook_core::{
    CancelFlag, ChangeNotifier, ExternalKey, ProviderAdapter, ProviderError, ProviderLink,
    RecordContent, RecordFilter, RemoteChange, MemoryStore, RecordStore, SyncEngine, SyncError,
    SyncStatus, SyncableRecord,
};

#[derive(Clone, Copy)]
enum FailPushes {
    No,
    Unavailable,
}

/// Scripted, call-counting adapter. `list_changes` drains the script so
/// each pass observes a change at most once, like a real watermarked
/// listing.
struct MockAdapter {
    name: String,
    writable: bool,
    script: Mutex<Vec<RemoteChange>>,
    fail_pushes: Mutex<FailPushes>,
    fail_listing: Mutex<bool>,
    reject_titles: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    next_key: AtomicUsize,
    deleted_keys: Mutex<Vec<ExternalKey>>,
    updated_titles: Mutex<Vec<String>>,
}

impl MockAdapter {
    fn new(name: &str) -> Arc<Self> {
        Self::with_writable(name, true)
    }

    fn read_only(name: &str) -> Arc<Self> {
        Self::with_writable(name, false)
    }

    fn with_writable(name: &str, writable: bool) -> Arc<Self> {
        Arc::new(MockAdapter {
            name: name.to_string(),
            writable,
            script: Mutex::new(Vec::new()),
            fail_pushes: Mutex::new(FailPushes::No),
            fail_listing: Mutex::new(false),
            reject_titles: Mutex::new(HashSet::new()),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            next_key: AtomicUsize::new(1),
            deleted_keys: Mutex::new(Vec::new()),
            updated_titles: Mutex::new(Vec::new()),
        })
    }

    fn script_change(&self, change: RemoteChange) {
        self.script.lock().unwrap().push(change);
    }

    fn push_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }

    fn fail_state(&self) -> Result<(), ProviderError> {
        match *self.fail_pushes.lock().unwrap() {
            FailPushes::No => Ok(()),
            FailPushes::Unavailable => {
                Err(ProviderError::Unavailable("socket closed".to_string()))
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_write(&self) -> bool {
        self.writable
    }

    async fn list_changes(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteChange>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_listing.lock().unwrap() {
            return Err(ProviderError::Unavailable("DNS failure".to_string()));
        }
        Ok(self.script.lock().unwrap().drain(..).collect())
    }

    async fn push_create(&self, content: &RecordContent) -> Result<ExternalKey, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_state()?;
        if self.reject_titles.lock().unwrap().contains(&content.title) {
            return Err(ProviderError::Rejected("title not allowed".to_string()));
        }
        let n = self.next_key.fetch_add(1, Ordering::SeqCst);
        Ok(ExternalKey::new(format!("K{n}")))
    }

    async fn push_update(
        &self,
        content: &RecordContent,
        _key: &ExternalKey,
    ) -> Result<(), ProviderError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_state()?;
        if self.reject_titles.lock().unwrap().contains(&content.title) {
            return Err(ProviderError::Rejected("title not allowed".to_string()));
        }
        self.updated_titles.lock().unwrap().push(content.title.clone());
        Ok(())
    }

    async fn push_delete(&self, key: &ExternalKey) -> Result<(), ProviderError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_state()?;
        self.deleted_keys.lock().unwrap().push(key.clone());
        Ok(())
    }
}

fn setup() -> (SyncEngine, Arc<MemoryStore>, ChangeNotifier) {
    let store = Arc::new(MemoryStore::new());
    let notifier = ChangeNotifier::new();
    let engine = SyncEngine::new(store.clone(), notifier.clone());
    (engine, store, notifier)
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_770_000_000 + secs, 0).unwrap()
}

fn all_records(store: &MemoryStore) -> Vec<SyncableRecord> {
    store
        .query(&RecordFilter {
            include_tombstoned: true,
            ..Default::default()
        })
        .unwrap()
}

#[tokio::test]
async fn create_push_then_second_pass_is_a_noop() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    let rec = SyncableRecord::new_local(RecordContent::task("Buy milk", ts(100)));
    store.save(&rec).unwrap();

    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(summary.pushed.created, 1);
    assert!(summary.watermark_advanced);

    let synced = store.get(rec.id).unwrap().unwrap();
    assert_eq!(synced.status, SyncStatus::Synced);
    assert_eq!(synced.external_key("mock").unwrap().item_id, "K1");

    // Second pass with no changes: no pushes, identical store state.
    let before = all_records(&store);
    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert!(!summary.has_changes());
    assert_eq!(adapter.push_calls(), 1);
    assert_eq!(all_records(&store), before);
}

#[tokio::test]
async fn pending_local_edit_wins_over_older_remote_update() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    // Synced record, then a local edit at T=200.
    let mut rec = SyncableRecord::new_local(RecordContent::task("Buy milk", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E1")).unwrap();
    rec.mark_synced(ts(50));
    rec.content.title = "Buy oat milk".to_string();
    rec.mark_pending();
    rec.last_modified_local = ts(200);
    store.save(&rec).unwrap();

    // Remote update stamped T=150: loses.
    let mut remote = RecordContent::task("Buy milk (remote)", ts(0));
    remote.notes = Some("from provider".to_string());
    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::new("E1"),
        content: remote,
        modified: Some(ts(150)),
    });

    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();

    let after = store.get(rec.id).unwrap().unwrap();
    assert_eq!(after.status, SyncStatus::Synced);
    assert_eq!(after.content.title, "Buy oat milk");
    assert!(after.content.notes.is_none());
    // The winning local content was pushed back out.
    assert_eq!(
        adapter.updated_titles.lock().unwrap().as_slice(),
        &["Buy oat milk".to_string()]
    );
}

#[tokio::test]
async fn older_local_edit_loses_to_newer_remote_update() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    let mut rec = SyncableRecord::new_local(RecordContent::task("Buy milk", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E1")).unwrap();
    rec.content.title = "Buy milk!".to_string();
    rec.mark_pending();
    rec.last_modified_local = ts(100);
    store.save(&rec).unwrap();

    let mut remote = RecordContent::event("Team lunch", ts(500));
    remote.location = Some("Nhà hàng Việt Thắng".to_string());
    remote.notes = Some("rescheduled".to_string());
    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::new("E1"),
        content: remote.clone(),
        modified: Some(ts(150)),
    });

    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();

    // Remote content replaces local, field for field.
    let after = store.get(rec.id).unwrap().unwrap();
    assert_eq!(after.content, remote);
    assert_eq!(after.status, SyncStatus::Synced);
    assert_eq!(after.last_modified_remote, Some(ts(150)));
    assert_eq!(adapter.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deletion_propagates_with_exactly_one_push_delete() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    let mut rec = SyncableRecord::new_local(RecordContent::task("old task", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E1")).unwrap();
    rec.mark_synced(ts(0));
    rec.mark_tombstoned();
    store.save(&rec).unwrap();

    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(summary.pushed.deleted, 1);
    assert_eq!(
        adapter.deleted_keys.lock().unwrap().as_slice(),
        &[ExternalKey::new("E1")]
    );
    assert!(store.get(rec.id).unwrap().is_none());

    // Nothing left to delete on the next pass.
    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(adapter.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_delete_means_already_gone_and_purges() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");

    let mut rec = SyncableRecord::new_local(RecordContent::task("gone", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E9")).unwrap();
    rec.mark_synced(ts(0));
    rec.mark_tombstoned();
    store.save(&rec).unwrap();

    // A Rejected delete means the item is already gone remotely, which
    // is the outcome deletion wanted: the record must still purge.
    struct RejectingDeletes(Arc<MockAdapter>);

    #[async_trait]
    impl ProviderAdapter for RejectingDeletes {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn can_write(&self) -> bool {
            true
        }
        async fn list_changes(
            &self,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<RemoteChange>, ProviderError> {
            self.0.list_changes(since).await
        }
        async fn push_delete(&self, _key: &ExternalKey) -> Result<(), ProviderError> {
            Err(ProviderError::Rejected("no such item".to_string()))
        }
    }

    let rejecting = RejectingDeletes(adapter);
    let summary = engine
        .sync_link(&mut link, &rejecting, &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(summary.pushed.deleted, 1);
    assert!(store.get(rec.id).unwrap().is_none());
}

#[tokio::test]
async fn feed_pull_creates_once_and_never_pushes() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::read_only("team-feed");
    let mut link = ProviderLink::new("team-feed", "feed");
    let cancel = CancelFlag::new();

    // A pending local record exists; a read-only link must leave it be.
    let local = SyncableRecord::new_local(RecordContent::task("mine", ts(0)));
    store.save(&local).unwrap();

    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::in_collection("F1", "team-feed"),
        content: RecordContent::event("Public holiday", ts(1000)),
        modified: Some(ts(10)),
    });

    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(summary.pulled.created, 1);
    assert_eq!(adapter.push_calls(), 0);

    let pulled = store
        .find_by_external_key("team-feed", &ExternalKey::in_collection("F1", "team-feed"))
        .unwrap()
        .unwrap();
    assert_eq!(pulled.status, SyncStatus::Synced);
    assert!(matches!(pulled.source, daybook_core::Source::Provider(ref p) if p == "team-feed"));

    // The local record is untouched and still pending.
    assert_eq!(
        store.get(local.id).unwrap().unwrap().status,
        SyncStatus::Pending
    );

    // Re-delivering the same feed snapshot creates nothing new.
    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::in_collection("F1", "team-feed"),
        content: RecordContent::event("Public holiday", ts(1000)),
        modified: Some(ts(10)),
    });
    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(all_records(&store).len(), 2);
}

#[tokio::test]
async fn pushed_record_is_not_recreated_by_echo_pull() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    let rec = SyncableRecord::new_local(RecordContent::task("once only", ts(0)));
    store.save(&rec).unwrap();

    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    let pushed = store.get(rec.id).unwrap().unwrap();
    let key = pushed.external_key("mock").unwrap().clone();

    // The provider now reports the record we just created as a "new"
    // remote item. Its key must be recognized, not re-created.
    adapter.script_change(RemoteChange::Upsert {
        key,
        content: pushed.content.clone(),
        modified: None,
    });

    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(summary.pulled.created, 0);
    assert_eq!(all_records(&store).len(), 1);
}

#[tokio::test]
async fn remote_delete_loses_to_pending_edit_and_is_recreated() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    let mut rec = SyncableRecord::new_local(RecordContent::task("edited", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E1")).unwrap();
    rec.content.notes = Some("keep me".to_string());
    rec.mark_pending();
    store.save(&rec).unwrap();

    adapter.script_change(RemoteChange::Delete {
        key: ExternalKey::new("E1"),
    });

    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();

    // Local won: re-created under a fresh key, old key forgotten.
    assert_eq!(summary.pushed.created, 1);
    assert_eq!(adapter.delete_calls.load(Ordering::SeqCst), 0);
    let after = store.get(rec.id).unwrap().unwrap();
    assert_eq!(after.status, SyncStatus::Synced);
    assert_eq!(after.external_key("mock").unwrap().item_id, "K1");
    assert_eq!(after.content.notes.as_deref(), Some("keep me"));
}

#[tokio::test]
async fn remote_delete_of_clean_record_purges_locally() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");

    let mut rec = SyncableRecord::new_local(RecordContent::task("remote owned", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E1")).unwrap();
    rec.mark_synced(ts(0));
    store.save(&rec).unwrap();

    adapter.script_change(RemoteChange::Delete {
        key: ExternalKey::new("E1"),
    });
    // A deletion for a key nobody has is ignored.
    adapter.script_change(RemoteChange::Delete {
        key: ExternalKey::new("E404"),
    });

    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.pulled.deleted, 1);
    assert!(store.get(rec.id).unwrap().is_none());
}

#[tokio::test]
async fn unavailable_provider_leaves_records_pending_for_retry() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    let rec = SyncableRecord::new_local(RecordContent::task("patient", ts(0)));
    store.save(&rec).unwrap();

    *adapter.fail_pushes.lock().unwrap() = FailPushes::Unavailable;
    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(summary.pending_retry, 1);
    assert_eq!(summary.pushed.created, 0);
    // Pull was clean, so the watermark still advances.
    assert!(summary.watermark_advanced);
    assert_eq!(
        store.get(rec.id).unwrap().unwrap().status,
        SyncStatus::Pending
    );

    // Provider back up: the retry succeeds.
    *adapter.fail_pushes.lock().unwrap() = FailPushes::No;
    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(summary.pushed.created, 1);
    assert_eq!(
        store.get(rec.id).unwrap().unwrap().status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn rejection_flags_the_record_and_spares_the_rest_of_the_pass() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    adapter.reject_titles.lock().unwrap().insert("bad".to_string());
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();

    let bad = SyncableRecord::new_local(RecordContent::task("bad", ts(0)));
    let good = SyncableRecord::new_local(RecordContent::task("good", ts(1)));
    store.save(&bad).unwrap();
    store.save(&good).unwrap();

    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();

    assert_eq!(summary.pushed.created, 1);
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].0, bad.id);

    let flagged = store.get(bad.id).unwrap().unwrap();
    assert_eq!(flagged.status, SyncStatus::Pending);
    assert_eq!(flagged.sync_error.as_deref(), Some("title not allowed"));

    // Not retried automatically on the next pass.
    let calls_before = adapter.create_calls.load(Ordering::SeqCst);
    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(adapter.create_calls.load(Ordering::SeqCst), calls_before);

    // A local edit clears the flag and re-queues the record.
    let mut edited = store.get(bad.id).unwrap().unwrap();
    edited.content.title = "better".to_string();
    edited.mark_pending();
    store.save(&edited).unwrap();
    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(summary.pushed.created, 1);
}

#[tokio::test]
async fn listing_failure_is_pass_fatal_and_holds_the_watermark() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");

    let rec = SyncableRecord::new_local(RecordContent::task("waiting", ts(0)));
    store.save(&rec).unwrap();

    *adapter.fail_listing.lock().unwrap() = true;
    let err = engine
        .sync_link(&mut link, adapter.as_ref(), &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Provider(ProviderError::Unavailable(_))));
    assert!(link.last_sync.is_none());
    // Nothing was pushed either: pull strictly precedes push.
    assert_eq!(adapter.push_calls(), 0);
}

#[tokio::test]
async fn cancelled_pass_changes_nothing_and_is_resumable() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");

    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::new("E1"),
        content: RecordContent::event("meeting", ts(100)),
        modified: Some(ts(10)),
    });

    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert!(link.last_sync.is_none());
    assert!(all_records(&store).is_empty());

    // Resume: re-script the undelivered change (the watermark never
    // moved) and run to completion.
    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::new("E1"),
        content: RecordContent::event("meeting", ts(100)),
        modified: Some(ts(10)),
    });
    let summary = engine
        .sync_link(&mut link, adapter.as_ref(), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.pulled.created, 1);
    assert!(link.last_sync.is_some());
}

#[tokio::test]
async fn newer_remote_upsert_resurrects_older_tombstone() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");

    let mut rec = SyncableRecord::new_local(RecordContent::task("deleted here", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E1")).unwrap();
    rec.mark_synced(ts(0));
    rec.mark_tombstoned();
    rec.last_modified_local = ts(100);
    store.save(&rec).unwrap();

    let remote = RecordContent::task("revived remotely", ts(0));
    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::new("E1"),
        content: remote.clone(),
        modified: Some(ts(200)),
    });

    engine
        .sync_link(&mut link, adapter.as_ref(), &CancelFlag::new())
        .await
        .unwrap();

    let after = store.get(rec.id).unwrap().unwrap();
    assert_eq!(after.status, SyncStatus::Synced);
    assert_eq!(after.content, remote);
    // The remote edit was newer, so no deletion was pushed.
    assert_eq!(adapter.delete_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn newer_tombstone_survives_older_remote_upsert() {
    let (engine, store, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");

    let mut rec = SyncableRecord::new_local(RecordContent::task("deleted here", ts(0)));
    rec.link_external_key("mock", ExternalKey::new("E1")).unwrap();
    rec.mark_synced(ts(0));
    rec.mark_tombstoned();
    rec.last_modified_local = ts(300);
    store.save(&rec).unwrap();

    adapter.script_change(RemoteChange::Upsert {
        key: ExternalKey::new("E1"),
        content: RecordContent::task("stale remote edit", ts(0)),
        modified: Some(ts(200)),
    });

    engine
        .sync_link(&mut link, adapter.as_ref(), &CancelFlag::new())
        .await
        .unwrap();

    // The deletion held and then propagated.
    assert_eq!(adapter.delete_calls.load(Ordering::SeqCst), 1);
    assert!(store.get(rec.id).unwrap().is_none());
}

#[tokio::test]
async fn pass_emits_one_change_signal_only_when_something_changed() {
    let (engine, store, notifier) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let cancel = CancelFlag::new();
    let mut signals = notifier.subscribe();

    let rec = SyncableRecord::new_local(RecordContent::task("signal me", ts(0)));
    store.save(&rec).unwrap();

    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert!(signals.try_recv().is_ok());
    assert!(signals.try_recv().is_err());

    // A no-op pass stays silent.
    engine
        .sync_link(&mut link, adapter.as_ref(), &cancel)
        .await
        .unwrap();
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn engine_state_reflects_pass_outcomes() {
    let (engine, _, _) = setup();
    let adapter = MockAdapter::new("mock");
    let mut link = ProviderLink::new("mock", "mock");
    let state = engine.state();

    assert_eq!(*state.borrow(), daybook_core::EngineState::Idle);

    engine
        .sync_link(&mut link, adapter.as_ref(), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(*state.borrow(), daybook_core::EngineState::Idle);

    *adapter.fail_listing.lock().unwrap() = true;
    let _ = engine
        .sync_link(&mut link, adapter.as_ref(), &CancelFlag::new())
        .await;
    assert_eq!(*state.borrow(), daybook_core::EngineState::Error);
}

#[tokio::test]
async fn sync_all_runs_independent_links() {
    let (engine, store, _) = setup();
    let feed = MockAdapter::read_only("feed");
    let gcal = MockAdapter::new("gcal");

    feed.script_change(RemoteChange::Upsert {
        key: ExternalKey::in_collection("F1", "feed"),
        content: RecordContent::event("feed item", ts(50)),
        modified: Some(ts(5)),
    });
    let local = SyncableRecord::new_local(RecordContent::task("push me", ts(0)));
    store.save(&local).unwrap();

    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
    adapters.insert("feed".to_string(), feed.clone());
    adapters.insert("gcal".to_string(), gcal.clone());

    let mut disabled = ProviderLink::new("paused", "gcal");
    disabled.enabled = false;

    let outcomes = engine
        .sync_all(
            vec![
                ProviderLink::new("feed", "feed"),
                ProviderLink::new("gcal", "gcal"),
                disabled,
            ],
            &adapters,
            &CancelFlag::new(),
        )
        .await;

    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        match outcome.link.name.as_str() {
            "paused" => {
                assert!(matches!(outcome.result, Err(SyncError::LinkDisabled(_))));
                assert!(outcome.link.last_sync.is_none());
            }
            _ => {
                assert!(outcome.result.is_ok());
                assert!(outcome.link.last_sync.is_some());
            }
        }
    }

    // The feed item was pulled; the local task was claimed by the
    // writable link only.
    assert_eq!(all_records(&store).len(), 2);
    assert_eq!(feed.push_calls(), 0);
    assert_eq!(gcal.create_calls.load(Ordering::SeqCst), 1);
}
