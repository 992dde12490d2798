//! Core types and sync engine for the daybook ecosystem.
//!
//! This crate provides the local-first record model and the
//! reconciliation engine that keeps it converged with external calendar
//! providers:
//! - `record` — syncable event/task records and their status lifecycle
//! - `store` — the record store contract plus in-memory and JSON-file stores
//! - `provider` — the provider adapter capability set and concrete adapters
//! - `engine` — pull/push reconciliation passes with last-writer-wins conflicts
//! - `delete` — the deletion coordination contract
//! - `notify` — the process-wide "data changed" signal

pub mod delete;
pub mod engine;
pub mod error;
pub mod link;
pub mod notify;
pub mod provider;
pub mod record;
pub mod store;

pub use delete::{DeletionCoordinator, NoopGate, NotificationGate};
pub use engine::{ApplyCounts, CancelFlag, EngineState, LinkOutcome, PassSummary, SyncEngine};
pub use error::{ProviderError, StateError, StoreError, SyncError, SyncResult};
pub use link::{LinkRegistry, ProviderLink};
pub use notify::ChangeNotifier;
pub use provider::{adapter_for, BinaryAdapter, FeedAdapter, ProviderAdapter, RemoteChange};
pub use record::{
    ExternalKey, ItemKind, Priority, RecordContent, Source, SyncStatus, SyncableRecord,
};
pub use store::{JsonStore, MemoryStore, RecordFilter, RecordStore};
