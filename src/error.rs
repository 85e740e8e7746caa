use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::shipment::{ShipmentCode, ShipmentStatus};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("timed out after {0:?} waiting for the record store")]
    Timeout(Duration),

    #[error("record {0} was modified concurrently")]
    VersionConflict(Uuid),

    #[error("record {0} no longer exists")]
    Missing(Uuid),

    #[error("record {0} already exists")]
    AlreadyExists(Uuid),

    #[error("a driver with email {email} or license number {license_number} already exists")]
    DuplicateDriver {
        email: String,
        license_number: String,
    },
}

impl StoreError {
    /// Conflicts that a fresh read may resolve.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict(_) | StoreError::Missing(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidRequest,
    Transient,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("shipment {0} not found")]
    ShipmentNotFound(Uuid),

    #[error("driver {0} not found")]
    DriverNotFound(Uuid),

    #[error("driver {driver_id} is not available: currently carrying shipment {}", fmt_ref(.current_shipment))]
    DriverUnavailable {
        driver_id: Uuid,
        current_shipment: Option<Uuid>,
    },

    #[error("shipment {code} is already Delivered and can no longer change")]
    ShipmentTerminal { shipment_id: Uuid, code: ShipmentCode },

    #[error("driver {driver_id} is assigned to shipment {shipment_id}; reassign or deliver it first")]
    DriverAssigned { driver_id: Uuid, shipment_id: Uuid },

    #[error("a driver with email {email} or license number {license_number} already exists")]
    DuplicateDriver {
        email: String,
        license_number: String,
    },

    #[error("invalid status {0:?}: must be Pending, In Transit, or Delivered")]
    InvalidStatus(String),

    #[error("shipment is already {0}")]
    NoOpTransition(ShipmentStatus),

    #[error("cannot change status from {from} to {to}; valid next status: {}", fmt_next(.expected))]
    IllegalTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
        expected: Option<ShipmentStatus>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("record store unavailable, retry the request: {0}")]
    Transient(StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ShipmentNotFound(_) | EngineError::DriverNotFound(_) => ErrorKind::NotFound,
            EngineError::DriverUnavailable { .. }
            | EngineError::ShipmentTerminal { .. }
            | EngineError::DriverAssigned { .. }
            | EngineError::DuplicateDriver { .. } => ErrorKind::Conflict,
            EngineError::InvalidStatus(_)
            | EngineError::NoOpTransition(_)
            | EngineError::IllegalTransition { .. }
            | EngineError::InvalidInput(_) => ErrorKind::InvalidRequest,
            EngineError::Transient(_) => ErrorKind::Transient,
        }
    }

    pub(crate) fn is_retryable_conflict(&self) -> bool {
        matches!(self, EngineError::Transient(err) if err.is_retryable_conflict())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateDriver {
                email,
                license_number,
            } => EngineError::DuplicateDriver {
                email,
                license_number,
            },
            other => EngineError::Transient(other),
        }
    }
}

fn fmt_ref(reference: &Option<Uuid>) -> String {
    reference
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn fmt_next(next: &Option<ShipmentStatus>) -> String {
    next.map(|status| status.to_string())
        .unwrap_or_else(|| "None (already at final state)".to_string())
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Conflict => AppError::Conflict(message),
            ErrorKind::InvalidRequest => AppError::BadRequest(message),
            ErrorKind::Transient => AppError::Unavailable(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
