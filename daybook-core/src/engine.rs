//! Reconciliation engine.
//!
//! Brings the record store and every enabled provider link into
//! agreement: pull remote changes, resolve conflicts last-writer-wins by
//! timestamp, push pending local changes, commit the watermark. Each
//! pass is deterministic, idempotent, and resumable after interruption:
//! re-running with no intervening change is a no-op, and a cancelled or
//! partially-failed pass re-delivers on the next run instead of losing
//! changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ProviderError, StoreError, SyncError};
use crate::link::ProviderLink;
use crate::notify::ChangeNotifier;
use crate::provider::{ProviderAdapter, RemoteChange};
use crate::record::{SyncStatus, SyncableRecord};
use crate::store::{RecordFilter, RecordStore};

/// Cooperative cancellation for sync passes. Checked between per-record
/// operations, never mid-operation, so a cancelled pass always leaves
/// records in their pre-pass or last-successfully-processed state.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Coarse engine activity, published on a watch channel for status UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Syncing,
    Error,
}

/// Per-kind operation counters for one side of a pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ApplyCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Outcome of one sync pass for one provider link.
#[derive(Debug, Default)]
pub struct PassSummary {
    pub link: String,
    pub pulled: ApplyCounts,
    pub pushed: ApplyCounts,
    /// Records left pending/tombstoned because the provider was
    /// transiently unavailable; retried next pass.
    pub pending_retry: usize,
    /// Permanent per-record rejections recorded this pass.
    pub rejected: Vec<(Uuid, String)>,
    /// Store failures while applying pulled changes; these block the
    /// watermark so the changes are re-delivered.
    pub store_warnings: usize,
    pub watermark_advanced: bool,
}

impl PassSummary {
    pub fn has_changes(&self) -> bool {
        self.pulled.total() > 0 || self.pushed.total() > 0
    }
}

/// Result of [`SyncEngine::sync_all`] for one link.
pub struct LinkOutcome {
    pub link: ProviderLink,
    pub result: Result<PassSummary, SyncError>,
}

/// The reconciliation engine. Collaborators are injected at
/// construction so test doubles slot in without any global registry.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    notifier: ChangeNotifier,
    state_tx: Arc<watch::Sender<EngineState>>,
    active_passes: Arc<AtomicUsize>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RecordStore>, notifier: ChangeNotifier) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Idle);
        SyncEngine {
            store,
            notifier,
            state_tx: Arc::new(state_tx),
            active_passes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Observe engine activity (`Idle`/`Syncing`/`Error`).
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Run one sync pass for one provider link.
    ///
    /// On success the link's watermark may have advanced; the caller is
    /// responsible for persisting the link (see
    /// [`LinkRegistry::commit`](crate::link::LinkRegistry::commit)).
    pub async fn sync_link(
        &self,
        link: &mut ProviderLink,
        adapter: &dyn ProviderAdapter,
        cancel: &CancelFlag,
    ) -> Result<PassSummary, SyncError> {
        if !link.enabled {
            return Err(SyncError::LinkDisabled(link.name.clone()));
        }

        self.pass_started();
        let result = self.run_pass(link, adapter, cancel).await;
        self.pass_finished(result.is_err());

        match &result {
            Ok(summary) => {
                info!(
                    link = %link.name,
                    pulled = summary.pulled.total(),
                    pushed = summary.pushed.total(),
                    pending_retry = summary.pending_retry,
                    rejected = summary.rejected.len(),
                    "sync pass complete"
                );
                if summary.has_changes() {
                    // After the store transactions commit, never before.
                    self.notifier.notify();
                }
            }
            Err(e) => warn!(link = %link.name, error = %e, "sync pass failed"),
        }

        result
    }

    /// Run sync passes for every given link concurrently. Each link's
    /// pass is internally sequential (pull fully before push); passes
    /// for distinct links do not block each other.
    pub async fn sync_all(
        &self,
        links: Vec<ProviderLink>,
        adapters: &HashMap<String, Arc<dyn ProviderAdapter>>,
        cancel: &CancelFlag,
    ) -> Vec<LinkOutcome> {
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::new();

        for mut link in links {
            if !link.enabled {
                let name = link.name.clone();
                outcomes.push(LinkOutcome {
                    link,
                    result: Err(SyncError::LinkDisabled(name)),
                });
                continue;
            }
            let Some(adapter) = adapters.get(&link.name).cloned() else {
                let name = link.name.clone();
                outcomes.push(LinkOutcome {
                    link,
                    result: Err(SyncError::NoAdapter(name)),
                });
                continue;
            };

            let engine = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = engine.sync_link(&mut link, adapter.as_ref(), &cancel).await;
                LinkOutcome { link, result }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "sync task panicked"),
            }
        }
        outcomes
    }

    async fn run_pass(
        &self,
        link: &mut ProviderLink,
        adapter: &dyn ProviderAdapter,
        cancel: &CancelFlag,
    ) -> Result<PassSummary, SyncError> {
        let pass_start = Utc::now();
        let mut summary = PassSummary {
            link: link.name.clone(),
            ..Default::default()
        };

        // Pull phase. A listing failure is pass-fatal: nothing has been
        // applied yet and the watermark must not move.
        let changes = adapter.list_changes(link.last_sync).await?;
        debug!(link = %link.name, count = changes.len(), "pulled remote changes");

        let mut pull_clean = true;
        for change in changes {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.apply_remote_change(adapter.name(), change, pass_start, &mut summary) {
                Ok(()) => {}
                Err(e) => {
                    // One bad record must not abort the pass, but its
                    // change has not been applied: hold the watermark
                    // back so it is re-delivered.
                    warn!(link = %link.name, error = %e, "failed to apply remote change");
                    summary.store_warnings += 1;
                    pull_clean = false;
                }
            }
        }

        // Push phase, only ever attempted against writable providers.
        if adapter.can_write() {
            let candidates = self
                .store
                .query(&RecordFilter::needs_push(adapter.name()))?;
            for candidate in candidates {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                self.push_record(adapter, candidate.id, &mut summary).await?;
            }
        }

        // Watermark commit: push retries are driven by record status,
        // so only an incomplete pull holds the watermark back.
        if pull_clean {
            link.last_sync = Some(pass_start);
            summary.watermark_advanced = true;
        }

        Ok(summary)
    }

    /// Apply one pulled change inside a single-record transaction.
    fn apply_remote_change(
        &self,
        provider: &str,
        change: RemoteChange,
        pass_start: DateTime<Utc>,
        summary: &mut PassSummary,
    ) -> Result<(), StoreError> {
        match change {
            RemoteChange::Delete { key } => {
                let Some(mut record) = self.store.find_by_external_key(provider, &key)? else {
                    // Deletion of something we never had: ignore.
                    return Ok(());
                };

                if record.status == SyncStatus::Pending {
                    // Local edit raced the remote deletion: local wins.
                    // Unlink so the push phase re-creates it remotely.
                    debug!(record = %record.id, "remote delete lost to pending local edit");
                    record.clear_external_key(provider);
                    self.store.save(&record)?;
                } else {
                    // The only authoritative provider confirmed the
                    // deletion; nothing is left to propagate.
                    self.store.remove(record.id)?;
                    summary.pulled.deleted += 1;
                }
                Ok(())
            }
            RemoteChange::Upsert { key, content, modified } => {
                let remote_time = modified.unwrap_or(pass_start);

                let Some(mut record) = self.store.find_by_external_key(provider, &key)? else {
                    let record = SyncableRecord::from_remote(provider, key, content, remote_time);
                    self.store.save(&record)?;
                    summary.pulled.created += 1;
                    return Ok(());
                };

                if record.status == SyncStatus::Synced && record.content == content {
                    // Already in agreement; skip the redundant write so a
                    // repeated pull of the same state is a true no-op.
                    return Ok(());
                }

                // Last-writer-wins. A locally-dirty record (pending edit
                // or tombstone) newer than the remote change survives and
                // is pushed next phase; otherwise remote content replaces
                // local, field for field.
                if record.status.is_locally_dirty() && record.last_modified_local > remote_time {
                    debug!(record = %record.id, "remote update lost to newer local change");
                    return Ok(());
                }

                record.content = content;
                record.mark_synced(remote_time);
                self.store.save(&record)?;
                summary.pulled.updated += 1;
                Ok(())
            }
        }
    }

    /// Push one dirty record, isolating per-record provider failures.
    ///
    /// Pass-fatal errors are store failures only; provider errors are
    /// absorbed into the summary per the retry policy.
    async fn push_record(
        &self,
        adapter: &dyn ProviderAdapter,
        id: Uuid,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        let provider = adapter.name();
        // Re-read inside the pass so each push works on the freshest
        // committed state.
        let Some(mut record) = self.store.get(id)? else {
            return Ok(());
        };

        if record.sync_error.is_some() {
            // Permanently rejected earlier; a local edit clears the flag.
            return Ok(());
        }

        match record.status {
            SyncStatus::Tombstoned => {
                let Some(key) = record.external_key(provider).cloned() else {
                    if record.external_keys.is_empty() {
                        // Nothing to propagate anywhere: purge now.
                        self.store.remove(record.id)?;
                        summary.pushed.deleted += 1;
                    }
                    return Ok(());
                };

                match adapter.push_delete(&key).await {
                    Ok(()) | Err(ProviderError::Rejected(_)) => {
                        // Rejected here means "already gone remotely",
                        // which is the outcome we wanted.
                        record.clear_external_key(provider);
                        if record.external_keys.is_empty() {
                            self.store.remove(record.id)?;
                        } else {
                            self.store.save(&record)?;
                        }
                        summary.pushed.deleted += 1;
                    }
                    Err(ProviderError::Unavailable(reason)) => {
                        debug!(record = %record.id, %reason, "delete deferred, provider unavailable");
                        summary.pending_retry += 1;
                    }
                    Err(e @ ProviderError::Unsupported) => return Err(e.into()),
                }
            }
            SyncStatus::Pending => {
                let pushed = match record.external_key(provider).cloned() {
                    None => match adapter.push_create(&record.content).await {
                        Ok(key) => {
                            record.link_external_key(provider, key)?;
                            summary.pushed.created += 1;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    },
                    Some(key) => match adapter.push_update(&record.content, &key).await {
                        Ok(()) => {
                            summary.pushed.updated += 1;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    },
                };

                match pushed {
                    Ok(()) => {
                        record.mark_synced(Utc::now());
                        self.store.save(&record)?;
                    }
                    Err(ProviderError::Unavailable(reason)) => {
                        debug!(record = %record.id, %reason, "push deferred, provider unavailable");
                        summary.pending_retry += 1;
                    }
                    Err(ProviderError::Rejected(reason)) => {
                        warn!(record = %record.id, %reason, "record rejected by provider");
                        record.sync_error = Some(reason.clone());
                        self.store.save(&record)?;
                        summary.rejected.push((record.id, reason));
                    }
                    Err(e @ ProviderError::Unsupported) => return Err(e.into()),
                }
            }
            SyncStatus::Synced | SyncStatus::LocalOnly => {}
        }

        Ok(())
    }

    fn pass_started(&self) {
        self.active_passes.fetch_add(1, Ordering::SeqCst);
        let _ = self.state_tx.send(EngineState::Syncing);
    }

    fn pass_finished(&self, failed: bool) {
        let remaining = self.active_passes.fetch_sub(1, Ordering::SeqCst) - 1;
        if failed {
            let _ = self.state_tx.send(EngineState::Error);
        } else if remaining == 0 {
            let _ = self.state_tx.send(EngineState::Idle);
        }
    }
}
