//! File-mirrored session store.
//!
//! The whole [`SessionLog`] is kept in memory and rewritten to a pretty-printed
//! JSON file after every `remember`. The in-memory log is authoritative: a
//! failed write is logged and the process carries on with what it has.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::traits::{SessionEntry, SessionLog, SessionStore};

pub struct JsonFileSessionStore {
    path: PathBuf,
    // Held across the append and the file write so disk order matches call order.
    log: Mutex<SessionLog>,
}

impl JsonFileSessionStore {
    /// Create a store mirroring to `path`, starting from an empty log.
    ///
    /// An existing file is left untouched until the first `remember`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            log: Mutex::new(SessionLog::new()),
        }
    }

    /// Create a store and hydrate it from `path` if the file exists.
    ///
    /// A file that cannot be parsed is moved aside to
    /// `<name>.corrupt-<millis>` so the next write does not destroy it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let log = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => SessionLog::new(),
            Ok(contents) => match serde_json::from_str::<SessionLog>(&contents) {
                Ok(log) => {
                    tracing::info!(
                        path = %path.display(),
                        users = log.len(),
                        "Hydrated session log"
                    );
                    log
                }
                Err(error) => {
                    let aside = move_aside(&path, "corrupt").await?;
                    tracing::warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        "Session file is not a valid session log ({error}); starting empty"
                    );
                    SessionLog::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionLog::new(),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file: {}", path.display())
                })
            }
        };

        Ok(Self {
            path,
            log: Mutex::new(log),
        })
    }

    /// Create a store that starts empty without reading `path`.
    ///
    /// Existing history at `path` is moved aside to `<name>.previous-<millis>`
    /// before the first write can replace it.
    pub async fn start_fresh(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                let aside = move_aside(&path, "previous").await?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    "Session hydration disabled; previous history moved aside"
                );
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to inspect session file: {}", path.display())
                })
            }
        }
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, log: &SessionLog) -> Result<()> {
        let json = serde_json::to_string_pretty(log).context("Failed to serialize session log")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create session directory: {}", parent.display())
            })?;
        }

        let temp_path = sibling_with_suffix(&self.path, ".tmp");
        fs::write(&temp_path, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            bail!("Failed to replace session file {}: {e}", self.path.display());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn remember(
        &self,
        user_id: &str,
        message: serde_json::Value,
        result: serde_json::Value,
    ) -> Result<()> {
        if user_id.is_empty() {
            bail!("user id must not be empty");
        }

        let mut log = self.log.lock().await;
        log.entry(user_id.to_string())
            .or_default()
            .push(SessionEntry::now(message, result));

        if let Err(error) = self.persist(&log).await {
            tracing::warn!(
                path = %self.path.display(),
                user_id,
                "Session mirror write failed, keeping in-memory log: {error:#}"
            );
        }
        Ok(())
    }

    async fn recall(&self, user_id: &str) -> Result<Vec<SessionEntry>> {
        Ok(self.log.lock().await.get(user_id).cloned().unwrap_or_default())
    }

    async fn users(&self) -> Result<Vec<String>> {
        Ok(self.log.lock().await.keys().cloned().collect())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|v| v.to_str())
        .unwrap_or("sessions.json");
    path.with_file_name(format!("{file_name}{suffix}"))
}

async fn move_aside(path: &Path, label: &str) -> Result<PathBuf> {
    let aside = sibling_with_suffix(
        path,
        &format!(".{label}-{}", chrono::Utc::now().timestamp_millis()),
    );
    fs::rename(path, &aside).await.with_context(|| {
        format!(
            "Session file {} could not be moved aside to {}",
            path.display(),
            aside.display()
        )
    })?;
    Ok(aside)
}
