use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::context::SharedContext;
use crate::metrics;

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub mail_provider: String,
    pub mail_sent: u64,
    pub mail_failed: u64,
    pub timestamp: String,
}

/// Health and metrics routes
pub fn health_routes() -> Router<Arc<SharedContext>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
}

/// GET /health - Health check endpoint
async fn health_check(State(ctx): State<Arc<SharedContext>>) -> Json<HealthResponse> {
    let snap = metrics::snapshot();

    Json(HealthResponse {
        status: "healthy".to_string(),
        mail_provider: ctx.mailer.name().to_string(),
        mail_sent: snap.sent,
        mail_failed: snap.failed,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /metrics - Prometheus text exposition
async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_prometheus(),
    )
}
