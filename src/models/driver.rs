use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Truck,
    #[default]
    Van,
    Bike,
    Car,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub license_number: String,
    pub vehicle_type: VehicleType,
    pub is_available: bool,
    pub current_shipment: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDriver {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub license_number: String,
    #[serde(default)]
    pub vehicle_type: VehicleType,
}

/// Profile fields only. Availability is owned by the assignment rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub license_number: Option<String>,
    pub vehicle_type: Option<VehicleType>,
}

impl Driver {
    pub fn new(details: &NewDriver, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: details.name.trim().to_string(),
            email: normalize_email(&details.email),
            phone: details.phone.trim().to_string(),
            license_number: normalize_license(&details.license_number),
            vehicle_type: details.vehicle_type,
            is_available: true,
            current_shipment: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_update(&mut self, update: &DriverUpdate, now: DateTime<Utc>) {
        if let Some(name) = &update.name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = &update.email {
            self.email = normalize_email(email);
        }
        if let Some(phone) = &update.phone {
            self.phone = phone.trim().to_string();
        }
        if let Some(license_number) = &update.license_number {
            self.license_number = normalize_license(license_number);
        }
        if let Some(vehicle_type) = update.vehicle_type {
            self.vehicle_type = vehicle_type;
        }
        self.updated_at = now;
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_license(raw: &str) -> String {
    raw.trim().to_uppercase()
}
