use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::request::FulfillmentRequest;
use super::resolver::{resolve_response, FulfillmentResponse, Resolution};
use crate::catalog::{CountsSource, ShopCounts};
use crate::events::{EventBus, FULFILLMENT_EVENT};
use crate::sessions::SessionStore;

#[derive(Debug, thiserror::Error)]
enum FulfillmentError {
    #[error("failed to record interaction for {user_id}: {cause:#}")]
    Record {
        user_id: String,
        cause: anyhow::Error,
    },
}

/// Resolve → record → emit, with every failure folded into the apology
/// response. `handle` always returns exactly one response.
pub struct FulfillmentHandler {
    sessions: Arc<dyn SessionStore>,
    bus: EventBus,
    counts: Arc<dyn CountsSource>,
}

impl FulfillmentHandler {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        bus: EventBus,
        counts: Arc<dyn CountsSource>,
    ) -> Self {
        Self {
            sessions,
            bus,
            counts,
        }
    }

    pub async fn handle(&self, request: FulfillmentRequest) -> FulfillmentResponse {
        match AssertUnwindSafe(self.fulfill(&request)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                tracing::error!(intent = %request.intent.raw(), "Fulfillment error: {error}");
                FulfillmentResponse::apology()
            }
            Err(_) => {
                tracing::error!(intent = %request.intent.raw(), "Fulfillment panicked");
                FulfillmentResponse::apology()
            }
        }
    }

    /// Convenience for transports that hand over raw bytes.
    pub async fn handle_body(&self, body: &[u8]) -> FulfillmentResponse {
        self.handle(FulfillmentRequest::from_slice(body)).await
    }

    async fn fulfill(
        &self,
        request: &FulfillmentRequest,
    ) -> Result<FulfillmentResponse, FulfillmentError> {
        let counts = match self.counts.counts().await {
            Ok(counts) => counts,
            Err(error) => {
                tracing::warn!(source = self.counts.name(), "Counts unavailable: {error:#}");
                ShopCounts::default()
            }
        };

        let Resolution { intent, response } = resolve_response(request, counts);

        match request.user_id.as_deref() {
            Some(user_id) => {
                let message = json!({
                    "intent": intent,
                    "queryText": request.query_text,
                });
                let result = json!({ "fulfillmentText": response.fulfillment_text });
                self.sessions
                    .remember(user_id, message, result)
                    .await
                    .map_err(|cause| FulfillmentError::Record {
                        user_id: user_id.to_string(),
                        cause,
                    })?;
            }
            None => tracing::debug!(intent = %intent, "No user id on request, not recording"),
        }

        let delivered = self.bus.publish(
            FULFILLMENT_EVENT,
            json!({ "intent": intent, "response": response.fulfillment_text }),
            request.user_id.as_deref(),
        );
        tracing::debug!(intent = %intent, delivered, "Fulfillment resolved");

        Ok(response)
    }
}
