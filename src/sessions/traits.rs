//! Session memory traits and types for per-user interaction history.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single remembered interaction. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntry {
    pub message: serde_json::Value,
    pub result: serde_json::Value,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
}

impl SessionEntry {
    pub fn now(message: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            message,
            result,
            time: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Every user's ordered history, keyed by user id.
///
/// This is also the on-disk layout of the session backing file.
pub type SessionLog = BTreeMap<String, Vec<SessionEntry>>;

/// Append-only per-user interaction history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append an entry for `user_id`, creating the user's history if needed.
    ///
    /// Backing-file failures are logged by the implementation and never
    /// returned; an `Err` means the entry was not recorded at all.
    async fn remember(
        &self,
        user_id: &str,
        message: serde_json::Value,
        result: serde_json::Value,
    ) -> Result<()>;

    /// The user's entries in insertion order, or an empty list.
    async fn recall(&self, user_id: &str) -> Result<Vec<SessionEntry>>;

    /// Known user ids, sorted.
    async fn users(&self) -> Result<Vec<String>>;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
