use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Env var that relocates the whole config directory (config.toml + workspace).
pub const CONFIG_DIR_ENV: &str = "EASLY_CONFIG_DIR";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level Easly configuration, loaded from `config.toml`.
///
/// Resolution order: `EASLY_CONFIG_DIR` env → `~/.easly/config.toml`.
/// Environment overrides are applied after the file is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from the config dir, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from the config dir, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Gateway server configuration: host, port, limits (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session memory backing file (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Retrieval backend availability probe (`[rag]`).
    #[serde(default)]
    pub rag: RagConfig,

    /// Order/inventory counts source for the dashboard intent (`[catalog]`).
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Remote health-check utility (`[health]`).
    #[serde(default)]
    pub health: HealthCheckConfig,

    /// Logging of bus activity (`[observability]`).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 3001)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum accepted request body in bytes (default: 64 KiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Broadcast buffer per `/ai/events` client before it starts skipping events.
    #[serde(default = "default_event_stream_capacity")]
    pub event_stream_capacity: usize,
}

fn default_gateway_port() -> u16 {
    3001
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_event_stream_capacity() -> usize {
    256
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            event_stream_capacity: default_event_stream_capacity(),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────

/// Session memory configuration (`[sessions]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Backing file, relative paths resolve under the workspace.
    /// Empty keeps sessions in memory only.
    #[serde(default = "default_sessions_path")]
    pub path: String,
    /// Load the backing file at startup instead of starting empty (default: true)
    #[serde(default = "default_true")]
    pub hydrate_on_start: bool,
}

fn default_sessions_path() -> String {
    "data/sessions.json".into()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            path: default_sessions_path(),
            hydrate_on_start: true,
        }
    }
}

// ── RAG ──────────────────────────────────────────────────────────

/// Retrieval backend configuration (`[rag]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// "chroma" | "none". `none` means no client is available.
    #[serde(default = "default_rag_backend")]
    pub backend: String,
    /// Chroma server URL. Overridden by `CHROMA_URL`.
    #[serde(default = "default_rag_url")]
    pub url: String,
    /// Collection bootstrapped by the probe. Overridden by `CHROMA_COLLECTION`.
    #[serde(default = "default_rag_collection")]
    pub collection: String,
    /// Probe timeout in milliseconds (default: 5000)
    #[serde(default = "default_rag_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rag_backend() -> String {
    "chroma".into()
}

fn default_rag_url() -> String {
    "http://localhost:8000".into()
}

fn default_rag_collection() -> String {
    "shopeasly_data".into()
}

fn default_rag_timeout_ms() -> u64 {
    5000
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            backend: default_rag_backend(),
            url: default_rag_url(),
            collection: default_rag_collection(),
            timeout_ms: default_rag_timeout_ms(),
        }
    }
}

// ── Catalog ──────────────────────────────────────────────────────

/// Dashboard counts source (`[catalog]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// "local" (JSON files) | "static"
    #[serde(default = "default_catalog_source")]
    pub source: String,
    /// Directory holding `orders.json` and `inventory.json`.
    /// Relative paths resolve under the workspace. Overridden by `DATA_DIR`.
    #[serde(default = "default_catalog_data_dir")]
    pub data_dir: String,
    /// Counts reported by the "static" source.
    #[serde(default)]
    pub static_orders: u64,
    #[serde(default)]
    pub static_inventory_items: u64,
}

fn default_catalog_source() -> String {
    "local".into()
}

fn default_catalog_data_dir() -> String {
    "data".into()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source: default_catalog_source(),
            data_dir: default_catalog_data_dir(),
            static_orders: 0,
            static_inventory_items: 0,
        }
    }
}

// ── Health check ─────────────────────────────────────────────────

/// Remote health-check utility configuration (`[health]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Endpoint polled by `easly health-check`. Overridden by `AI_HEALTH_URL`.
    #[serde(default = "default_health_url")]
    pub url: String,
    /// Request timeout in milliseconds (default: 3000)
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_health_url() -> String {
    "http://127.0.0.1:3001/ai/health".into()
}

fn default_health_timeout_ms() -> u64 {
    3000
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            url: default_health_url(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log every bus event through `tracing` (default: true)
    #[serde(default = "default_true")]
    pub log_events: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_events: true }
    }
}

fn default_true() -> bool {
    true
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let easly_dir = home.join(".easly");

        Self {
            workspace_dir: easly_dir.join("workspace"),
            config_path: easly_dir.join("config.toml"),
            gateway: GatewayConfig::default(),
            sessions: SessionsConfig::default(),
            rag: RagConfig::default(),
            catalog: CatalogConfig::default(),
            health: HealthCheckConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".easly"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir.trim())),
        _ => default_config_dir(),
    }
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        let mut config = Self::load_or_init_in(&config_dir).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from `config_dir`, writing defaults on first run.
    /// Does not apply environment overrides.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");
        let workspace_dir = config_dir.join("workspace");

        fs::create_dir_all(&workspace_dir).await.with_context(|| {
            format!(
                "Failed to create workspace directory: {}",
                workspace_dir.display()
            )
        })?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            // Set computed paths that are skipped during serialization
            config.config_path = config_path;
            config.workspace_dir = workspace_dir;
            tracing::info!(
                path = %config.config_path.display(),
                workspace = %config.workspace_dir.display(),
                initialized = false,
                "Config loaded"
            );
            Ok(config)
        } else {
            let mut config = Config::default();
            config.config_path = config_path;
            config.workspace_dir = workspace_dir;
            config.save().await?;
            tracing::info!(
                path = %config.config_path.display(),
                workspace = %config.workspace_dir.display(),
                initialized = true,
                "Config loaded"
            );
            Ok(config)
        }
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.max_body_bytes == 0 {
            anyhow::bail!("gateway.max_body_bytes must be greater than 0");
        }
        match self.rag.backend.trim().to_ascii_lowercase().as_str() {
            "chroma" | "none" => {}
            other => anyhow::bail!("Unknown rag.backend '{other}'. Supported values: chroma, none"),
        }
        if self.rag.collection.trim().is_empty() {
            anyhow::bail!("rag.collection must not be empty");
        }
        if self.rag.timeout_ms == 0 {
            anyhow::bail!("rag.timeout_ms must be greater than 0");
        }
        match self.catalog.source.trim().to_ascii_lowercase().as_str() {
            "local" | "static" => {}
            other => {
                anyhow::bail!("Unknown catalog.source '{other}'. Supported values: local, static")
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Same as [`Config::apply_env_overrides`] with an explicit variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        };

        // Gateway port: EASLY_GATEWAY_PORT or PORT
        if let Some(port_str) = first(&["EASLY_GATEWAY_PORT", "PORT"]) {
            match port_str.trim().parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(port = %port_str, "Ignoring invalid gateway port override"),
            }
        }

        // Gateway host: EASLY_GATEWAY_HOST or HOST
        if let Some(host) = first(&["EASLY_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }

        if let Some(path) = first(&["EASLY_SESSIONS_PATH"]) {
            self.sessions.path = path;
        }

        if let Some(backend) = first(&["EASLY_RAG_BACKEND"]) {
            self.rag.backend = backend.trim().to_ascii_lowercase();
        }
        if let Some(url) = first(&["CHROMA_URL"]) {
            self.rag.url = url;
        }
        if let Some(collection) = first(&["CHROMA_COLLECTION"]) {
            self.rag.collection = collection;
        }

        if let Some(dir) = first(&["DATA_DIR"]) {
            self.catalog.data_dir = dir;
        }

        if let Some(url) = first(&["AI_HEALTH_URL"]) {
            self.health.url = url;
        }
    }

    /// Resolve a configured path: absolute paths are kept, relative ones
    /// are joined onto the workspace directory.
    pub fn resolve_workspace_path(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw.trim());
        if path.is_absolute() {
            path
        } else {
            self.workspace_dir.join(path)
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("config.toml");
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
