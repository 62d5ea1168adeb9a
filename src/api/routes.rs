//! HTTP route handlers and server startup.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::relay::RelayClient;
use crate::task::{iso8601, TaskIdGenerator};
use crate::upload::UploadReceiver;

use super::submit;
use super::types::HealthResponse;

/// Headroom above the attachment limit for the text fields and multipart
/// framing, so an oversize file is caught by the upload check rather than
/// the raw body limit.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Shared application state, built once at startup.
pub struct AppState {
    pub config: Config,
    pub uploads: UploadReceiver,
    pub relay: RelayClient,
    pub ids: TaskIdGenerator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let uploads = UploadReceiver::new(config.upload_dir.clone(), config.max_upload_bytes);
        let relay = RelayClient::new(config.webhook_url.clone());
        Self {
            config,
            uploads,
            relay,
            ids: TaskIdGenerator::new(),
        }
    }
}

/// Build the application router around a state.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(
        state
            .config
            .max_upload_bytes
            .saturating_add(FORM_OVERHEAD_BYTES),
    )
    .unwrap_or(usize::MAX);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/webhook", post(submit::submit_task))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone()));
    match state.relay.destination() {
        Some(url) => tracing::info!("Relaying tasks to {}", url),
        None => tracing::warn!(
            "N8N_WEBHOOK_URL is not set; submissions will fail until it is configured"
        ),
    }

    state.uploads.ensure_dir().await.with_context(|| {
        format!(
            "Failed to create upload directory {}",
            state.uploads.dir().display()
        )
    })?;

    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Backend running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        time: iso8601(&chrono::Utc::now()),
    })
}
