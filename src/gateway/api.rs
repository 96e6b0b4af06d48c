//! Route handlers for the gateway.
//!
//! `POST /fulfillment` never reports resolution failures through the status
//! code; every outcome is a `200` with a `fulfillmentText` body.

use super::AppState;
use crate::events::HEALTH_EVENT;
use crate::fulfillment::FulfillmentResponse;
use crate::rag::CheckOptions;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Json,
    },
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;

// ── Query parameters ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RagQuery {
    pub force: Option<bool>,
}

// ── Handlers ────────────────────────────────────────────────────

/// POST /fulfillment: webhook from the NLU platform (or a direct caller)
pub async fn handle_fulfillment(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<FulfillmentResponse> {
    Json(state.handler.handle_body(&body).await)
}

/// GET /health: liveness
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "sessions": state.sessions.name(),
        "subscribers": state.bus.subscriber_count(),
    }))
}

/// GET /ai/health: liveness plus retrieval availability
pub async fn handle_ai_health(State(state): State<AppState>) -> impl IntoResponse {
    let rag = state.probe.check(CheckOptions::default()).await;
    let body = serde_json::json!({ "ok": true, "rag": rag });
    state.bus.publish(HEALTH_EVENT, body.clone(), None);
    Json(body)
}

/// GET /ai/rag?force=true: availability probe result
pub async fn handle_rag_status(
    State(state): State<AppState>,
    Query(params): Query<RagQuery>,
) -> impl IntoResponse {
    let options = CheckOptions {
        force: params.force.unwrap_or(false),
    };
    Json(state.probe.check(options).await)
}

/// GET /ai/sessions/{user_id}: recorded interactions for one user
pub async fn handle_session_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.recall(&user_id).await {
        Ok(entries) => Json(serde_json::json!({
            "userId": user_id,
            "entries": entries,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Session recall failed: {e}")})),
        )
            .into_response(),
    }
}

/// GET /ai/events: live bus events as server-sent events
pub async fn handle_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = state.bus.subscribe_channel(state.event_stream_capacity);

    let stream = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let data = serde_json::to_string(&event).unwrap_or_default();
        let sse = SseEvent::default().event(event.event_type).data(data);
        Some((Ok(sse), events))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
