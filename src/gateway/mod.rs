//! Axum-based HTTP gateway for the assistant backend.
//!
//! Serves the fulfillment webhook plus a handful of read-only status routes
//! and a server-sent-events feed of bus events.

pub mod api;

use crate::catalog::create_counts_source;
use crate::config::{Config, GatewayConfig};
use crate::events::EventBus;
use crate::fulfillment::FulfillmentHandler;
use crate::observability::EventLogSink;
use crate::rag::{create_probe, AvailabilityProbe};
use crate::sessions::{create_session_store, SessionStore};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<FulfillmentHandler>,
    pub sessions: Arc<dyn SessionStore>,
    pub bus: EventBus,
    pub probe: Arc<AvailabilityProbe>,
    pub event_stream_capacity: usize,
}

impl AppState {
    /// Wire every component described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let sessions: Arc<dyn SessionStore> = Arc::from(
            create_session_store(&config.sessions, &config.workspace_dir)
                .await
                .context("failed to open session store")?,
        );
        let counts = Arc::new(create_counts_source(config)?);
        let bus = EventBus::new();

        if config.observability.log_events {
            // The sink lives for the lifetime of the bus.
            let _ = bus.subscribe(EventLogSink);
        }

        let handler = Arc::new(FulfillmentHandler::new(
            Arc::clone(&sessions),
            bus.clone(),
            counts,
        ));

        Ok(Self {
            handler,
            sessions,
            bus,
            probe: Arc::new(create_probe(&config.rag)),
            event_stream_capacity: config.gateway.event_stream_capacity,
        })
    }
}

/// Build the router with body-limit and timeout layers from `[gateway]`.
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/fulfillment", post(api::handle_fulfillment))
        .route("/health", get(api::handle_health))
        .route("/ai/health", get(api::handle_ai_health))
        .route("/ai/rag", get(api::handle_rag_status))
        .route("/ai/sessions/{user_id}", get(api::handle_session_history))
        .route("/ai/events", get(api::handle_event_stream))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
}

/// Run the HTTP gateway until Ctrl-C.
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = AppState::from_config(&config).await?;
    let app = build_router(state.clone(), &config.gateway);

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid gateway address {}:{}",
                config.gateway.host, config.gateway.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let actual = listener.local_addr()?;

    tracing::info!(
        addr = %actual,
        sessions = state.sessions.name(),
        "Gateway listening"
    );
    println!("🛍️  Easly gateway listening on http://{actual}");
    println!("  POST /fulfillment     webhook fulfillment");
    println!("  GET  /ai/health       health + retrieval availability");
    println!("  GET  /ai/events       live event feed (SSE)");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
