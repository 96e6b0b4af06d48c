//! Minimal Chroma HTTP client: just enough to bootstrap a collection.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::traits::{ProbeError, RetrievalBackend};

const DEFAULT_TENANT: &str = "default_tenant";
const DEFAULT_DATABASE: &str = "default_database";

pub struct ChromaClient {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    get_or_create: bool,
}

impl ChromaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn collections_url(&self) -> String {
        format!("{}/api/v1/collections", self.base_url)
    }

    /// Chroma 0.6+ serves collections per tenant and database only.
    fn collections_url_v2(&self) -> String {
        format!(
            "{}/api/v2/tenants/{DEFAULT_TENANT}/databases/{DEFAULT_DATABASE}/collections",
            self.base_url
        )
    }

    async fn create_collection_at(&self, url: String, collection: &str) -> Result<(), ProbeError> {
        let response = self
            .client
            .post(url)
            .json(&CreateCollectionRequest {
                name: collection,
                get_or_create: true,
            })
            .send()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProbeError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

/// Statuses a server without the v1 API answers with.
fn v1_unsupported(error: &ProbeError) -> bool {
    matches!(error, ProbeError::Status { status: 404 | 405 | 410, .. })
}

#[async_trait]
impl RetrievalBackend for ChromaClient {
    async fn get_or_create_collection(&self, collection: &str) -> Result<(), ProbeError> {
        match self
            .create_collection_at(self.collections_url(), collection)
            .await
        {
            Err(error) if v1_unsupported(&error) => {
                tracing::debug!(base_url = %self.base_url, "Chroma v1 API unavailable, using v2: {error}");
                self.create_collection_at(self.collections_url_v2(), collection)
                    .await
            }
            other => other,
        }
    }

    fn name(&self) -> &str {
        "chroma"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn collections_url_strips_trailing_slash() {
        let client = ChromaClient::new("http://localhost:8000/");
        assert_eq!(
            client.collections_url(),
            "http://localhost:8000/api/v1/collections"
        );
    }

    #[test]
    fn request_body_asks_for_get_or_create() {
        let body = serde_json::to_value(CreateCollectionRequest {
            name: "shopeasly_data",
            get_or_create: true,
        })
        .unwrap();
        assert_eq!(body["name"], "shopeasly_data");
        assert_eq!(body["get_or_create"], true);
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    fn v2_route() -> &'static str {
        "/api/v2/tenants/default_tenant/databases/default_database/collections"
    }

    #[test]
    fn v2_url_uses_default_tenant_and_database() {
        let client = ChromaClient::new("http://localhost:8000");
        assert_eq!(
            client.collections_url_v2(),
            format!("http://localhost:8000{}", v2_route())
        );
    }

    #[tokio::test]
    async fn v1_server_is_used_directly() {
        let v2_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&v2_hits);
        let url = serve(
            Router::new()
                .route(
                    "/api/v1/collections",
                    post(|Json(body): Json<serde_json::Value>| async move {
                        assert_eq!(body["get_or_create"], true);
                        Json(serde_json::json!({"name": body["name"]}))
                    }),
                )
                .route(
                    v2_route(),
                    post(move || {
                        hits.fetch_add(1, Ordering::SeqCst);
                        async { StatusCode::OK }
                    }),
                ),
        )
        .await;

        ChromaClient::new(&url)
            .get_or_create_collection("shopeasly_data")
            .await
            .unwrap();
        assert_eq!(v2_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_v1_api_falls_back_to_v2() {
        let url = serve(Router::new().route(
            v2_route(),
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(serde_json::json!({"name": body["name"]}))
            }),
        ))
        .await;

        ChromaClient::new(&url)
            .get_or_create_collection("shopeasly_data")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn v1_server_error_is_not_retried_on_v2() {
        let url = serve(
            Router::new()
                .route(
                    "/api/v1/collections",
                    post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
                )
                .route(v2_route(), post(|| async { StatusCode::OK })),
        )
        .await;

        let err = ChromaClient::new(&url)
            .get_or_create_collection("x")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Status { status: 500, .. }), "{err}");
        assert_eq!(err.to_string(), "backend returned 500: boom");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        // Port 9 (discard) on localhost is essentially never an HTTP server.
        let client = ChromaClient::new("http://127.0.0.1:9");
        let err = client.get_or_create_collection("x").await.unwrap_err();
        assert!(matches!(err, ProbeError::Request(_)));
    }
}
