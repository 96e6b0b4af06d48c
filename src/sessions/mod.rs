//! Session memory: append-only per-user interaction history.

pub mod in_memory;
pub mod json_file;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use json_file::JsonFileSessionStore;
pub use traits::{SessionEntry, SessionLog, SessionStore};

use crate::config::SessionsConfig;
use anyhow::Result;
use std::path::Path;

/// Factory: create the session store described by config.
///
/// An empty `sessions.path` selects the in-memory store. Relative paths are
/// resolved under `workspace_dir`. Without hydration, an existing file is
/// moved aside rather than overwritten.
pub async fn create_session_store(
    config: &SessionsConfig,
    workspace_dir: &Path,
) -> Result<Box<dyn SessionStore>> {
    let raw = config.path.trim();
    if raw.is_empty() {
        return Ok(Box::new(InMemorySessionStore::new()));
    }

    let path = workspace_dir.join(raw);
    if config.hydrate_on_start {
        Ok(Box::new(JsonFileSessionStore::open(path).await?))
    } else {
        Ok(Box::new(JsonFileSessionStore::start_fresh(path).await?))
    }
}
