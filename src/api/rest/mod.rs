pub mod drivers;
pub mod shipments;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

const ACTOR_HEADER: &str = "x-actor";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(shipments::router())
        .merge(drivers::router())
        .route("/api/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .fallback_service(ServeDir::new("static"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Caller identity recorded in status history; falls back to the
/// configured default when the header is absent or blank.
pub(crate) fn actor(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.default_actor.clone())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    shipments: usize,
    drivers: usize,
    link_violations: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let violations = state.engine.link_violations().await?;
    if !violations.is_empty() {
        tracing::error!(count = violations.len(), ?violations, "shipment/driver links disagree");
    }

    Ok(Json(HealthResponse {
        status: if violations.is_empty() { "ok" } else { "degraded" },
        shipments: state.engine.store().shipment_count(),
        drivers: state.engine.store().driver_count(),
        link_violations: violations.len(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
