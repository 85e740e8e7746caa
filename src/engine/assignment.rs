use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::driver::Driver;
use crate::models::shipment::Shipment;

pub fn ensure_available(driver: &Driver) -> Result<(), EngineError> {
    if !driver.is_available || driver.current_shipment.is_some() {
        return Err(EngineError::DriverUnavailable {
            driver_id: driver.id,
            current_shipment: driver.current_shipment,
        });
    }
    Ok(())
}

pub fn ensure_not_terminal(shipment: &Shipment) -> Result<(), EngineError> {
    if shipment.status.is_terminal() {
        return Err(EngineError::ShipmentTerminal {
            shipment_id: shipment.id,
            code: shipment.code.clone(),
        });
    }
    Ok(())
}

pub fn ensure_deletable(driver: &Driver) -> Result<(), EngineError> {
    match driver.current_shipment {
        Some(shipment_id) => Err(EngineError::DriverAssigned {
            driver_id: driver.id,
            shipment_id,
        }),
        None => Ok(()),
    }
}

/// Points the shipment and the driver at each other and marks the driver busy.
pub fn link(shipment: &mut Shipment, driver: &mut Driver, now: DateTime<Utc>) {
    shipment.driver = Some(driver.id);
    shipment.updated_at = now;
    driver.current_shipment = Some(shipment.id);
    driver.is_available = false;
    driver.updated_at = now;
}

/// Makes the driver available again. Returns false when it already was.
pub fn release(driver: &mut Driver, now: DateTime<Utc>) -> bool {
    if driver.is_available && driver.current_shipment.is_none() {
        return false;
    }
    driver.is_available = true;
    driver.current_shipment = None;
    driver.updated_at = now;
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkViolation {
    ShipmentPointsAway { shipment: Uuid, driver: Uuid },
    ShipmentPointsToMissingDriver { shipment: Uuid, driver: Uuid },
    DriverPointsAway { driver: Uuid, shipment: Uuid },
    DriverPointsToMissingShipment { driver: Uuid, shipment: Uuid },
    AvailabilityMismatch { driver: Uuid },
}

/// Checks referential symmetry across both tables and the availability flag
/// of every driver.
pub fn verify_links(
    shipments: &HashMap<Uuid, Shipment>,
    drivers: &HashMap<Uuid, Driver>,
) -> Vec<LinkViolation> {
    let mut violations = Vec::new();

    for shipment in shipments.values() {
        let Some(driver_id) = shipment.driver else {
            continue;
        };
        match drivers.get(&driver_id) {
            None => violations.push(LinkViolation::ShipmentPointsToMissingDriver {
                shipment: shipment.id,
                driver: driver_id,
            }),
            Some(driver) if driver.current_shipment != Some(shipment.id) => {
                violations.push(LinkViolation::ShipmentPointsAway {
                    shipment: shipment.id,
                    driver: driver_id,
                })
            }
            Some(_) => {}
        }
    }

    for driver in drivers.values() {
        if driver.is_available == driver.current_shipment.is_some() {
            violations.push(LinkViolation::AvailabilityMismatch { driver: driver.id });
        }
        let Some(shipment_id) = driver.current_shipment else {
            continue;
        };
        match shipments.get(&shipment_id) {
            None => violations.push(LinkViolation::DriverPointsToMissingShipment {
                driver: driver.id,
                shipment: shipment_id,
            }),
            Some(shipment) if shipment.driver != Some(driver.id) => {
                violations.push(LinkViolation::DriverPointsAway {
                    driver: driver.id,
                    shipment: shipment_id,
                })
            }
            Some(_) => {}
        }
    }

    violations
}
