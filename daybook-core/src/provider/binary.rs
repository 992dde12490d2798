//! Provider subprocess adapter.
//!
//! Drives an external `daybook-provider-<kind>` binary over the JSON
//! stdin/stdout protocol. Every call is wrapped in a timeout; a timeout
//! is a transient failure (`ProviderUnavailable`), retried on the next
//! pass.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::protocol::{Command as ProviderCommand, Request, Response};
use crate::provider::{ProviderAdapter, RemoteChange};
use crate::record::{ExternalKey, RecordContent};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BinaryAdapter {
    kind: String,
    link_name: String,
    params: serde_json::Value,
    writable: bool,
    timeout: Duration,
}

impl BinaryAdapter {
    pub fn new(
        kind: impl Into<String>,
        link_name: impl Into<String>,
        params: serde_json::Value,
        writable: bool,
    ) -> Self {
        BinaryAdapter {
            kind: kind.into(),
            link_name: link_name.into(),
            params,
            writable,
            timeout: PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn binary_path(&self) -> Result<std::path::PathBuf, ProviderError> {
        let binary_name = format!("daybook-provider-{}", self.kind);
        which::which(&binary_name).map_err(|_| {
            ProviderError::Unavailable(format!(
                "provider '{}' not installed ({} not on PATH)",
                self.kind, binary_name
            ))
        })
    }

    /// Merge call-specific params over the link params.
    fn request_params(&self, extra: serde_json::Value) -> serde_json::Value {
        let mut params = self.params.clone();
        if let (Some(base), Some(add)) = (params.as_object_mut(), extra.as_object()) {
            for (k, v) in add {
                base.insert(k.clone(), v.clone());
            }
            params
        } else {
            extra
        }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        command: ProviderCommand,
        extra: serde_json::Value,
    ) -> Result<R, ProviderError> {
        let request = Request {
            command,
            params: self.request_params(extra),
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| ProviderError::Rejected(format!("unencodable request: {e}")))?;

        let binary_path = self.binary_path()?;
        debug!(provider = %self.kind, ?command, "calling provider binary");

        timeout(self.timeout, self.exchange(&binary_path, &request_json))
            .await
            .map_err(|_| {
                ProviderError::Unavailable(format!(
                    "provider '{}' timed out after {}s",
                    self.kind,
                    self.timeout.as_secs()
                ))
            })?
    }

    async fn exchange<R: DeserializeOwned>(
        &self,
        binary_path: &std::path::Path,
        request_json: &str,
    ) -> Result<R, ProviderError> {
        let mut child = Command::new(binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|e| {
                ProviderError::Unavailable(format!(
                    "failed to spawn {}: {e}",
                    binary_path.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(format!("{request_json}\n").as_bytes())
                .await
                .map_err(|e| ProviderError::Unavailable(format!("provider stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("provider wait: {e}")))?;

        if !output.status.success() {
            return Err(ProviderError::Unavailable(format!(
                "provider exited with status {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(ProviderError::Unavailable(
                "provider returned no response".to_string(),
            ));
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| ProviderError::Unavailable(format!("malformed provider response: {e}")))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error, retryable } if retryable => {
                Err(ProviderError::Unavailable(error))
            }
            Response::Error { error, .. } => Err(ProviderError::Rejected(error)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for BinaryAdapter {
    fn name(&self) -> &str {
        &self.link_name
    }

    fn can_write(&self) -> bool {
        self.writable
    }

    async fn list_changes(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteChange>, ProviderError> {
        let params = serde_json::json!({
            "since": since.map(|t| t.to_rfc3339()),
        });
        self.call(ProviderCommand::ListChanges, params).await
    }

    async fn push_create(&self, content: &RecordContent) -> Result<ExternalKey, ProviderError> {
        let params = serde_json::json!({ "item": content });
        self.call(ProviderCommand::CreateItem, params).await
    }

    async fn push_update(
        &self,
        content: &RecordContent,
        key: &ExternalKey,
    ) -> Result<(), ProviderError> {
        let params = serde_json::json!({ "item": content, "key": key });
        self.call(ProviderCommand::UpdateItem, params).await
    }

    async fn push_delete(&self, key: &ExternalKey) -> Result<(), ProviderError> {
        let params = serde_json::json!({ "key": key });
        self.call(ProviderCommand::DeleteItem, params).await
    }
}
