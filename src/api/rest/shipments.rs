use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor;
use crate::engine::dashboard::Dashboard;
use crate::error::AppError;
use crate::models::filter::ShipmentFilter;
use crate::models::shipment::{NewShipment, Shipment, ShipmentUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/shipments", post(create_shipment).get(list_shipments))
        .route(
            "/api/shipments/:id",
            get(get_shipment).put(update_shipment).delete(delete_shipment),
        )
        .route("/api/shipments/:id/status", patch(update_status))
        .route("/api/shipments/:id/assign-driver", patch(assign_driver))
        .route("/api/dashboard", get(dashboard))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

async fn create_shipment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NewShipment>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let actor = actor(&headers, &state);
    let shipment = state.engine.create_shipment(payload, &actor).await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

async fn list_shipments(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ShipmentFilter>,
) -> Json<Vec<Shipment>> {
    Json(state.engine.list_shipments(&filter))
}

async fn get_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(state.engine.get_shipment(id)?))
}

async fn update_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ShipmentUpdate>,
) -> Result<Json<Shipment>, AppError> {
    let actor = actor(&headers, &state);
    Ok(Json(state.engine.update_shipment(id, payload, &actor).await?))
}

async fn delete_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let actor = actor(&headers, &state);
    state.engine.delete_shipment(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Shipment>, AppError> {
    let actor = actor(&headers, &state);
    let shipment = state
        .engine
        .update_status(id, &payload.status, &actor)
        .await?;
    Ok(Json(shipment))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Shipment>, AppError> {
    let actor = actor(&headers, &state);
    let shipment = state
        .engine
        .assign_driver(id, payload.driver_id, &actor)
        .await?;
    Ok(Json(shipment))
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.engine.dashboard().await?))
}
