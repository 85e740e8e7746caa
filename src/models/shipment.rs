use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ShipmentStatus {
    Pending,
    #[serde(rename = "In Transit")]
    InTransit,
    Delivered,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 3] = [
        ShipmentStatus::Pending,
        ShipmentStatus::InTransit,
        ShipmentStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "Pending",
            ShipmentStatus::InTransit => "In Transit",
            ShipmentStatus::Delivered => "Delivered",
        }
    }

    /// Matches the wire spelling exactly; `"in transit"` is not accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == raw)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable shipment identifier such as `SHP000042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentCode(String);

impl ShipmentCode {
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShipmentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub status: ShipmentStatus,
    pub timestamp: DateTime<Utc>,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    #[serde(rename = "shipment_id")]
    pub code: ShipmentCode,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub weight: Option<f64>,
    pub description: Option<String>,
    pub driver: Option<Uuid>,
    pub status: ShipmentStatus,
    pub status_history: Vec<StatusChange>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivered_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewShipment {
    pub name: String,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
}

/// Descriptive fields only; status and driver go through the engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentUpdate {
    pub name: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub weight: Option<f64>,
    pub description: Option<String>,
}

impl Shipment {
    pub fn new(code: ShipmentCode, details: &NewShipment, actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            name: details.name.trim().to_string(),
            origin: details.origin.trim().to_string(),
            destination: details.destination.trim().to_string(),
            weight: details.weight,
            description: details
                .description
                .as_ref()
                .map(|description| description.trim().to_string()),
            driver: None,
            status: ShipmentStatus::Pending,
            status_history: vec![StatusChange {
                status: ShipmentStatus::Pending,
                timestamp: now,
                updated_by: actor.to_string(),
            }],
            delivered_at: None,
            delivered_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_update(&mut self, update: &ShipmentUpdate, now: DateTime<Utc>) {
        if let Some(name) = &update.name {
            self.name = name.trim().to_string();
        }
        if let Some(origin) = &update.origin {
            self.origin = origin.trim().to_string();
        }
        if let Some(destination) = &update.destination {
            self.destination = destination.trim().to_string();
        }
        if update.weight.is_some() {
            self.weight = update.weight;
        }
        if let Some(description) = &update.description {
            self.description = Some(description.trim().to_string());
        }
        self.updated_at = now;
    }
}
