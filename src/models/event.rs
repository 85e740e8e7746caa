use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::shipment::{Shipment, ShipmentCode, ShipmentStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentEventKind {
    Created,
    StatusChanged,
    DriverAssigned,
    Updated,
    Deleted,
}

/// Published after every committed shipment mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub kind: ShipmentEventKind,
    pub shipment_id: Uuid,
    pub shipment_code: ShipmentCode,
    pub status: ShipmentStatus,
    pub driver: Option<Uuid>,
    pub released_driver: Option<Uuid>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl ShipmentEvent {
    pub fn new(
        kind: ShipmentEventKind,
        shipment: &Shipment,
        released_driver: Option<Uuid>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            shipment_id: shipment.id,
            shipment_code: shipment.code.clone(),
            status: shipment.status,
            driver: shipment.driver,
            released_driver,
            actor: actor.to_string(),
            at,
        }
    }
}
