use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use uuid::Uuid;

use crate::api::rest::actor;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverUpdate, NewDriver};
use crate::models::filter::DriverFilter;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/drivers", post(create_driver).get(list_drivers))
        .route("/api/drivers/available", get(list_available_drivers))
        .route(
            "/api/drivers/:id",
            get(get_driver).put(update_driver).delete(delete_driver),
        )
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NewDriver>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let actor = actor(&headers, &state);
    let driver = state.engine.create_driver(payload, &actor).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DriverFilter>,
) -> Json<Vec<Driver>> {
    Json(state.engine.list_drivers(&filter))
}

async fn list_available_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.engine.list_drivers(&DriverFilter {
        available: Some(true),
    }))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.engine.get_driver(id)?))
}

async fn update_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<DriverUpdate>,
) -> Result<Json<Driver>, AppError> {
    let actor = actor(&headers, &state);
    Ok(Json(state.engine.update_driver(id, payload, &actor).await?))
}

async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let actor = actor(&headers, &state);
    state.engine.delete_driver(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
