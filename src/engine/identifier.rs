use crate::models::shipment::ShipmentCode;
use crate::store::Store;

const PREFIX: &str = "SHP";
const WIDTH: usize = 6;

/// `SHP` followed by the sequence number zero-padded to six digits. Past
/// 999999 the number simply grows wider.
pub fn format_code(sequence: u64) -> ShipmentCode {
    ShipmentCode::from_raw(format!("{PREFIX}{sequence:0WIDTH$}"))
}

/// Draws the next identifier from the store's sequence counter. Called once
/// per creation, before any retry loop, so a retried commit keeps its code.
pub fn next_code(store: &Store) -> ShipmentCode {
    format_code(store.reserve_shipment_sequence())
}
