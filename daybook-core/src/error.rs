//! Error types for the daybook core.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by provider adapters.
///
/// The engine's retry policy hangs off this distinction: `Unavailable`
/// leaves records pending for the next pass, `Rejected` flags the record
/// and stops retrying it, `Unsupported` is a programming error (a push
/// issued against a read-only adapter) and is never produced at runtime
/// by a correctly-driven engine.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transient: network failure, expired auth, rate limit, timeout.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Permanent for this record: remote validation failure, record
    /// vanished, permission denied for that item.
    #[error("provider rejected the record: {0}")]
    Rejected(String),

    /// Push called on a read-only adapter.
    #[error("operation not supported by read-only provider")]
    Unsupported,
}

/// Errors raised by a [`RecordStore`](crate::store::RecordStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

/// Violation of a record-state invariant.
#[derive(Error, Debug)]
pub enum StateError {
    /// A record may carry at most one provider's external key.
    #[error("record is already linked to provider '{0}'")]
    AlreadyLinked(String),
}

/// Pass-level sync errors.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("record state error: {0}")]
    State(#[from] StateError),

    #[error("sync pass cancelled")]
    Cancelled,

    #[error("link '{0}' is disabled")]
    LinkDisabled(String),

    #[error("no adapter available for link '{0}'")]
    NoAdapter(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for daybook operations.
pub type SyncResult<T> = Result<T, SyncError>;
