use serde::Deserialize;
use uuid::Uuid;

use crate::models::driver::Driver;
use crate::models::shipment::{Shipment, ShipmentStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    pub driver: Option<Uuid>,
    pub code: Option<String>,
}

impl ShipmentFilter {
    pub fn matches(&self, shipment: &Shipment) -> bool {
        self.status.is_none_or(|status| shipment.status == status)
            && self.driver.is_none_or(|driver| shipment.driver == Some(driver))
            && self
                .code
                .as_deref()
                .is_none_or(|code| shipment.code.as_str().eq_ignore_ascii_case(code.trim()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverFilter {
    pub available: Option<bool>,
}

impl DriverFilter {
    pub fn matches(&self, driver: &Driver) -> bool {
        self.available
            .is_none_or(|available| driver.is_available == available)
    }
}
