use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of an availability check. Cached by the probe and handed out
/// unchanged until a forced refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityResult {
    pub available: bool,
    pub reason: Option<String>,
    pub collection: String,
    pub url: String,
}

/// Failure modes of a retrieval backend bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("chromadb module missing")]
    ClientMissing,
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("{0}")]
    Request(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend client panicked")]
    Panicked,
}

/// Client for the optional retrieval-augmentation backend.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Idempotently ensure `collection` exists.
    async fn get_or_create_collection(&self, collection: &str) -> Result<(), ProbeError>;
    fn name(&self) -> &str;
}
