//! Abode Server - agent and workflow API
//!
//! HTTP layer over an immutable [`Runtime`]: single-agent invocation, named
//! workflow invocation, and read-only health, metrics and definition
//! endpoints.

pub mod error;
pub mod http;
pub mod metrics;
pub mod startup;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use abode_core::runtime::Runtime;

use crate::metrics::Metrics;
use crate::startup::{StartupConfig, DEFAULT_REQUEST_TIMEOUT_SECS};

/// Shared application state
///
/// Everything here is read-only after startup apart from the atomic metrics.
pub struct AppState {
    pub runtime: Runtime,
    pub metrics: Metrics,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(runtime: Runtime) -> Self {
        let metrics = Metrics::for_runtime(&runtime);
        Self {
            runtime,
            metrics,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn from_startup(runtime: Runtime, startup: &StartupConfig) -> Self {
        Self::new(runtime).with_request_timeout(startup.request_timeout)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Execution endpoints
        .route("/generate", post(http::generate))
        .route("/workflow/{name}", post(http::run_workflow))
        // Introspection endpoints
        .route("/health", get(http::health))
        .route("/metrics", get(http::get_metrics))
        .route("/workflows/status", get(http::workflow_status))
        // Definition endpoints
        .route("/agents", get(http::list_agents))
        .route("/agents/{name}", get(http::get_agent))
        .route("/tools", get(http::list_tools))
        .route("/workflows", get(http::list_workflows))
        .fallback(http::not_found)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server, returning after Ctrl-C
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Abode server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Abode server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
