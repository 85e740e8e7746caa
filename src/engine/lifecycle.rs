use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::shipment::{Shipment, ShipmentStatus, StatusChange};

/// The single legal next state, if any.
pub fn successor(status: ShipmentStatus) -> Option<ShipmentStatus> {
    match status {
        ShipmentStatus::Pending => Some(ShipmentStatus::InTransit),
        ShipmentStatus::InTransit => Some(ShipmentStatus::Delivered),
        ShipmentStatus::Delivered => None,
    }
}

pub fn parse_requested(raw: &str) -> Result<ShipmentStatus, EngineError> {
    ShipmentStatus::parse(raw).ok_or_else(|| EngineError::InvalidStatus(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ShipmentStatus,
    /// Driver that must be made available in the same unit of work.
    pub release: Option<Uuid>,
}

/// Advances `shipment` to `requested` and appends the history entry.
///
/// Delivery stamps `delivered_at`, moves the driver reference to
/// `delivered_by`, and reports that driver in [`Transition::release`]; the
/// caller must commit the driver release together with the shipment.
pub fn transition(
    shipment: &mut Shipment,
    requested: ShipmentStatus,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Transition, EngineError> {
    let from = shipment.status;

    if requested == from {
        return Err(EngineError::NoOpTransition(from));
    }

    let expected = successor(from);
    if expected != Some(requested) {
        return Err(EngineError::IllegalTransition {
            from,
            to: requested,
            expected,
        });
    }

    shipment.status = requested;
    shipment.status_history.push(StatusChange {
        status: requested,
        timestamp: now,
        updated_by: actor.to_string(),
    });
    shipment.updated_at = now;

    let mut release = None;
    if requested == ShipmentStatus::Delivered {
        shipment.delivered_at = Some(now);
        release = shipment.driver.take();
        shipment.delivered_by = release;
    }

    Ok(Transition { from, release })
}

/// True when the recorded statuses are a prefix of the lifecycle chain and
/// the last entry matches the current status.
pub fn history_is_well_formed(shipment: &Shipment) -> bool {
    let statuses = shipment.status_history.iter().map(|change| change.status);
    let chain = ShipmentStatus::ALL.into_iter();

    let len = shipment.status_history.len();
    len >= 1
        && len <= ShipmentStatus::ALL.len()
        && statuses.zip(chain).all(|(recorded, expected)| recorded == expected)
        && shipment.status_history.last().map(|change| change.status) == Some(shipment.status)
}
