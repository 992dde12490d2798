//! Provider wire protocol.
//!
//! Defines the JSON protocol spoken between the engine and provider
//! binaries over stdin/stdout. The protocol is language-agnostic: any
//! executable that speaks it can be a provider.
//!
//! Providers manage their own credentials and tokens; the engine just
//! passes opaque parameters from the link configuration.

use serde::{Deserialize, Serialize};

/// Commands that provider binaries must implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ListChanges,
    CreateItem,
    UpdateItem,
    DeleteItem,
}

/// Request sent from the engine to a provider binary.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response sent from a provider binary to the engine.
///
/// `retryable` distinguishes transient failures (network, expired auth;
/// retried next pass) from permanent per-record rejections.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success {
        data: T,
    },
    Error {
        error: String,
        #[serde(default)]
        retryable: bool,
    },
}

impl<T: Serialize> Response<T> {
    pub fn success(data: T) -> String {
        serde_json::to_string(&Response::Success { data }).unwrap_or_default()
    }
}

impl Response<()> {
    pub fn error(msg: &str, retryable: bool) -> String {
        serde_json::to_string(&Response::<()>::Error {
            error: msg.to_string(),
            retryable,
        })
        .unwrap_or_default()
    }
}
