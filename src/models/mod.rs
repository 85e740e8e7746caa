pub mod driver;
pub mod event;
pub mod filter;
pub mod shipment;
