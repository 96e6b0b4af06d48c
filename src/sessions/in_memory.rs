//! In-memory session store implementation.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{SessionEntry, SessionLog, SessionStore};

/// A session store with no backing file. History lives for the process only.
pub struct InMemorySessionStore {
    log: Mutex<SessionLog>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(SessionLog::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn remember(
        &self,
        user_id: &str,
        message: serde_json::Value,
        result: serde_json::Value,
    ) -> Result<()> {
        if user_id.is_empty() {
            bail!("user id must not be empty");
        }
        self.log
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .push(SessionEntry::now(message, result));
        Ok(())
    }

    async fn recall(&self, user_id: &str) -> Result<Vec<SessionEntry>> {
        Ok(self.log.lock().get(user_id).cloned().unwrap_or_default())
    }

    async fn users(&self) -> Result<Vec<String>> {
        Ok(self.log.lock().keys().cloned().collect())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
