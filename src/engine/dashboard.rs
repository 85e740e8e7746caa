use serde::Serialize;

use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::store::Snapshot;

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: ShipmentStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentTotals {
    pub total: usize,
    pub pending: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub status_breakdown: Vec<StatusCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverTotals {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub shipments: ShipmentTotals,
    pub drivers: DriverTotals,
    pub recent_shipments: Vec<Shipment>,
}

impl Dashboard {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let count = |status: ShipmentStatus| {
            snapshot
                .shipments
                .values()
                .filter(|shipment| shipment.status == status)
                .count()
        };

        let status_breakdown: Vec<StatusCount> = ShipmentStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: count(status),
            })
            .collect();

        let available = snapshot
            .drivers
            .values()
            .filter(|driver| driver.is_available)
            .count();

        let mut recent_shipments: Vec<Shipment> = snapshot.shipments.values().cloned().collect();
        recent_shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_shipments.truncate(RECENT_LIMIT);

        Self {
            shipments: ShipmentTotals {
                total: snapshot.shipments.len(),
                pending: status_breakdown[0].count,
                in_transit: status_breakdown[1].count,
                delivered: status_breakdown[2].count,
                status_breakdown,
            },
            drivers: DriverTotals {
                total: snapshot.drivers.len(),
                available,
                busy: snapshot.drivers.len() - available,
            },
            recent_shipments,
        }
    }
}
