//! Cached availability check for the retrieval backend.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::{AvailabilityResult, ProbeError, RetrievalBackend};

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    /// Discard the cached result and probe again.
    pub force: bool,
}

/// Memoized, single-flight availability check.
///
/// The first `check` (or any forced one) runs the backend bootstrap; later
/// calls get the cached result without I/O. Recomputation happens under an
/// async mutex, so concurrent callers wait for the in-flight probe instead
/// of repeating it.
pub struct AvailabilityProbe {
    backend: Option<Arc<dyn RetrievalBackend>>,
    url: String,
    collection: String,
    timeout: Duration,
    cache: Mutex<Option<AvailabilityResult>>,
    runs: AtomicU64,
}

impl AvailabilityProbe {
    /// `backend = None` models a deployment without the retrieval client.
    pub fn new(
        backend: Option<Arc<dyn RetrievalBackend>>,
        url: &str,
        collection: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            url: url.to_string(),
            collection: collection.to_string(),
            timeout,
            cache: Mutex::new(None),
            runs: AtomicU64::new(0),
        }
    }

    pub async fn check(&self, options: CheckOptions) -> AvailabilityResult {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|_| !options.force) {
            return cached.clone();
        }

        let result = self.probe().await;
        *cache = Some(result.clone());
        result
    }

    /// The cached result, if one exists and no probe is in flight.
    pub fn cached(&self) -> Option<AvailabilityResult> {
        self.cache.try_lock().ok().and_then(|cache| cache.clone())
    }

    /// How many times the backend bootstrap has actually been attempted.
    pub fn probe_runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    async fn probe(&self) -> AvailabilityResult {
        let outcome = match &self.backend {
            None => Err(ProbeError::ClientMissing),
            Some(backend) => {
                self.runs.fetch_add(1, Ordering::Relaxed);
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                let bootstrap =
                    AssertUnwindSafe(backend.get_or_create_collection(&self.collection))
                        .catch_unwind();
                match tokio::time::timeout(self.timeout, bootstrap).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(ProbeError::Panicked),
                    Err(_) => Err(ProbeError::Timeout(timeout_ms)),
                }
            }
        };

        let (available, reason) = match outcome {
            Ok(()) => (true, None),
            Err(error) => {
                tracing::info!(
                    url = %self.url,
                    collection = %self.collection,
                    "Retrieval backend unavailable: {error}"
                );
                (false, Some(error.to_string()))
            }
        };

        AvailabilityResult {
            available,
            reason,
            collection: self.collection.clone(),
            url: self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    struct FakeBackend {
        delay: Duration,
        outcomes: SyncMutex<Vec<Result<(), ProbeError>>>,
        calls: AtomicU64,
    }

    impl FakeBackend {
        fn new(outcomes: Vec<Result<(), ProbeError>>) -> Self {
            Self::slow(Duration::ZERO, outcomes)
        }

        fn slow(delay: Duration, outcomes: Vec<Result<(), ProbeError>>) -> Self {
            Self {
                delay,
                outcomes: SyncMutex::new(outcomes),
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl RetrievalBackend for FakeBackend {
        async fn get_or_create_collection(&self, _collection: &str) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut outcomes = self.outcomes.lock();
            if outcomes.is_empty() {
                Ok(())
            } else {
                outcomes.remove(0)
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn probe_with(backend: Arc<FakeBackend>, timeout: Duration) -> AvailabilityProbe {
        AvailabilityProbe::new(
            Some(backend),
            "http://localhost:8000",
            "shopeasly_data",
            timeout,
        )
    }

    #[tokio::test]
    async fn missing_client_reports_module_missing() {
        let probe = AvailabilityProbe::new(
            None,
            "http://localhost:8000",
            "shopeasly_data",
            Duration::from_secs(1),
        );

        let result = probe.check(CheckOptions::default()).await;
        assert_eq!(
            result,
            AvailabilityResult {
                available: false,
                reason: Some("chromadb module missing".into()),
                collection: "shopeasly_data".into(),
                url: "http://localhost:8000".into(),
            }
        );
        assert_eq!(probe.cached(), Some(result));
    }

    #[tokio::test]
    async fn second_check_is_served_from_cache() {
        let backend = Arc::new(FakeBackend::new(vec![Ok(())]));
        let probe = probe_with(Arc::clone(&backend), Duration::from_secs(1));

        let first = probe.check(CheckOptions::default()).await;
        let second = probe.check(CheckOptions::default()).await;

        assert!(first.available);
        assert!(first.reason.is_none());
        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.probe_runs(), 1);
    }

    #[tokio::test]
    async fn force_always_reprobes() {
        let backend = Arc::new(FakeBackend::new(vec![
            Ok(()),
            Err(ProbeError::Request("connection refused".into())),
        ]));
        let probe = probe_with(Arc::clone(&backend), Duration::from_secs(1));

        assert!(probe.check(CheckOptions::default()).await.available);
        let forced = probe.check(CheckOptions { force: true }).await;

        assert!(!forced.available);
        assert_eq!(forced.reason.as_deref(), Some("connection refused"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        // The refreshed value replaces the cache.
        assert_eq!(probe.check(CheckOptions::default()).await, forced);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_unavailable() {
        let backend = Arc::new(FakeBackend::slow(Duration::from_secs(5), vec![Ok(())]));
        let probe = probe_with(backend, Duration::from_millis(20));

        let result = probe.check(CheckOptions::default()).await;
        assert!(!result.available);
        assert_eq!(result.reason.as_deref(), Some("timed out after 20ms"));
    }

    struct PanickingBackend;

    #[async_trait]
    impl RetrievalBackend for PanickingBackend {
        async fn get_or_create_collection(&self, _collection: &str) -> Result<(), ProbeError> {
            panic!("client bug")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn backend_panic_is_reported_as_unavailable() {
        let probe = AvailabilityProbe::new(
            Some(Arc::new(PanickingBackend)),
            "http://localhost:8000",
            "shopeasly_data",
            Duration::from_secs(1),
        );

        let result = probe.check(CheckOptions::default()).await;
        assert!(!result.available);
        assert_eq!(result.reason.as_deref(), Some("backend client panicked"));
        assert_eq!(probe.cached(), Some(result));
    }

    #[tokio::test]
    async fn concurrent_checks_share_one_probe() {
        let backend = Arc::new(FakeBackend::slow(Duration::from_millis(50), vec![Ok(())]));
        let probe = Arc::new(probe_with(Arc::clone(&backend), Duration::from_secs(1)));

        let a = tokio::spawn({
            let probe = Arc::clone(&probe);
            async move { probe.check(CheckOptions::default()).await }
        });
        let b = tokio::spawn({
            let probe = Arc::clone(&probe);
            async move { probe.check(CheckOptions::default()).await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a, b);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
