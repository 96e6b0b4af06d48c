//! Retrieval-augmentation backend: client and cached availability probe.

pub mod chroma;
pub mod probe;
pub mod traits;

pub use chroma::ChromaClient;
pub use probe::{AvailabilityProbe, CheckOptions};
pub use traits::{AvailabilityResult, ProbeError, RetrievalBackend};

use crate::config::RagConfig;
use std::sync::Arc;
use std::time::Duration;

/// Factory: resolve the retrieval client for the configured backend.
///
/// `None` when the deployment has no retrieval backend.
pub fn create_retrieval_backend(config: &RagConfig) -> Option<Arc<dyn RetrievalBackend>> {
    match config.backend.trim().to_ascii_lowercase().as_str() {
        "chroma" => Some(Arc::new(ChromaClient::new(&config.url))),
        _ => None,
    }
}

pub fn create_probe(config: &RagConfig) -> AvailabilityProbe {
    AvailabilityProbe::new(
        create_retrieval_backend(config),
        &config.url,
        &config.collection,
        Duration::from_millis(config.timeout_ms),
    )
}
