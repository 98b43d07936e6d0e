//! Pull-based metrics endpoint and HTTP health probe

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::ServiceContext;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the metrics-port router: `/metrics` in Prometheus text
/// exposition format plus a plain HTTP health probe.
pub fn router(ctx: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}

async fn metrics(State(ctx): State<Arc<ServiceContext>>) -> Result<String, StatusCode> {
    ctx.metrics
        .encode()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "SERVING".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
