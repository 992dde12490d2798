//! Provider adapters.
//!
//! Each external system (a provider binary, a subscription feed) is
//! driven through the [`ProviderAdapter`] capability set. Read-only
//! systems implement only [`list_changes`]; the engine checks
//! [`can_write`] before ever attempting a push.
//!
//! [`list_changes`]: ProviderAdapter::list_changes
//! [`can_write`]: ProviderAdapter::can_write

mod binary;
mod feed;
pub mod protocol;

pub use binary::BinaryAdapter;
pub use feed::FeedAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, SyncError};
use crate::link::ProviderLink;
use crate::record::{ExternalKey, RecordContent};

/// One remote-side change observed since a watermark.
///
/// Creations and updates are indistinguishable from the adapter's point
/// of view; the engine decides by whether the external key maps to a
/// local record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum RemoteChange {
    Upsert {
        key: ExternalKey,
        content: RecordContent,
        /// The remote's own modification time, when the provider
        /// supplies one. The engine falls back to pull time otherwise.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modified: Option<DateTime<Utc>>,
    },
    Delete {
        key: ExternalKey,
    },
}

/// Capability set implemented once per external system.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider-link name; the discriminator under which external keys
    /// are stored on records.
    fn name(&self) -> &str;

    /// Whether push operations may be attempted at all.
    fn can_write(&self) -> bool;

    /// Changes observed since the watermark, in arbitrary order.
    async fn list_changes(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteChange>, ProviderError>;

    async fn push_create(&self, _content: &RecordContent) -> Result<ExternalKey, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn push_update(
        &self,
        _content: &RecordContent,
        _key: &ExternalKey,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn push_delete(&self, _key: &ExternalKey) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported)
    }
}

/// Build the adapter for a configured provider link.
///
/// `feed` links are read-only ICS subscriptions; any other provider kind
/// is an external `daybook-provider-<kind>` binary.
pub fn adapter_for(link: &ProviderLink) -> Result<Arc<dyn ProviderAdapter>, SyncError> {
    match link.provider.as_str() {
        "feed" => {
            let endpoint = link.endpoint.clone().ok_or_else(|| {
                SyncError::Config(format!("feed link '{}' has no endpoint", link.name))
            })?;
            Ok(Arc::new(FeedAdapter::new(&link.name, endpoint)))
        }
        kind => Ok(Arc::new(BinaryAdapter::new(
            kind,
            &link.name,
            link.params(),
            !link.read_only,
        ))),
    }
}
