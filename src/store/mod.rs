//! In-process record store for shipments and drivers.
//!
//! Every mutation goes through a [`UnitOfWork`]: the caller stages inserts,
//! updates and deletes against the versions it read, and [`Store::commit`]
//! applies all of them or none. Commits are serialized by a single lock whose
//! acquisition is bounded by the configured timeout; plain reads never take it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::driver::Driver;
use crate::models::filter::{DriverFilter, ShipmentFilter};
use crate::models::shipment::Shipment;

#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub record: T,
    pub version: u64,
}

#[derive(Debug, Clone)]
enum Write {
    InsertShipment(Shipment),
    UpdateShipment { record: Shipment, expected: u64 },
    DeleteShipment { id: Uuid, expected: u64 },
    InsertDriver(Driver),
    UpdateDriver { record: Driver, expected: u64 },
    DeleteDriver { id: Uuid, expected: u64 },
}

/// Writes that commit together or not at all.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    writes: Vec<Write>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_shipment(&mut self, shipment: Shipment) -> &mut Self {
        self.writes.push(Write::InsertShipment(shipment));
        self
    }

    /// `read` is the version the change was computed from.
    pub fn update_shipment(&mut self, shipment: Shipment, read: u64) -> &mut Self {
        self.writes.push(Write::UpdateShipment {
            record: shipment,
            expected: read,
        });
        self
    }

    pub fn delete_shipment(&mut self, id: Uuid, read: u64) -> &mut Self {
        self.writes.push(Write::DeleteShipment { id, expected: read });
        self
    }

    pub fn insert_driver(&mut self, driver: Driver) -> &mut Self {
        self.writes.push(Write::InsertDriver(driver));
        self
    }

    pub fn update_driver(&mut self, driver: Driver, read: u64) -> &mut Self {
        self.writes.push(Write::UpdateDriver {
            record: driver,
            expected: read,
        });
        self
    }

    pub fn delete_driver(&mut self, id: Uuid, read: u64) -> &mut Self {
        self.writes.push(Write::DeleteDriver { id, expected: read });
        self
    }
}

/// A view of both tables taken while no commit is in flight.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub shipments: HashMap<Uuid, Shipment>,
    pub drivers: HashMap<Uuid, Driver>,
}

pub struct Store {
    shipments: DashMap<Uuid, Versioned<Shipment>>,
    drivers: DashMap<Uuid, Versioned<Driver>>,
    shipment_sequence: AtomicU64,
    commit_lock: Mutex<()>,
    lock_timeout: Duration,
}

impl Store {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shipments: DashMap::new(),
            drivers: DashMap::new(),
            shipment_sequence: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
            lock_timeout,
        }
    }

    /// Reserves the next shipment sequence number. Numbers are handed out
    /// once; a creation that later fails leaves a gap.
    pub fn reserve_shipment_sequence(&self) -> u64 {
        self.shipment_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn shipment(&self, id: &Uuid) -> Option<Versioned<Shipment>> {
        self.shipments.get(id).map(|entry| entry.value().clone())
    }

    pub fn driver(&self, id: &Uuid) -> Option<Versioned<Driver>> {
        self.drivers.get(id).map(|entry| entry.value().clone())
    }

    pub fn shipment_count(&self) -> usize {
        self.shipments.len()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    /// Newest first.
    pub fn list_shipments(&self, filter: &ShipmentFilter) -> Vec<Shipment> {
        let mut shipments: Vec<Shipment> = self
            .shipments
            .iter()
            .filter(|entry| filter.matches(&entry.value().record))
            .map(|entry| entry.value().record.clone())
            .collect();
        shipments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.code.as_str().cmp(a.code.as_str()))
        });
        shipments
    }

    /// Newest first.
    pub fn list_drivers(&self, filter: &DriverFilter) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .filter(|entry| filter.matches(&entry.value().record))
            .map(|entry| entry.value().record.clone())
            .collect();
        drivers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        drivers
    }

    pub async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let _guard = self.lock().await?;

        Ok(Snapshot {
            shipments: self
                .shipments
                .iter()
                .map(|entry| (*entry.key(), entry.value().record.clone()))
                .collect(),
            drivers: self
                .drivers
                .iter()
                .map(|entry| (*entry.key(), entry.value().record.clone()))
                .collect(),
        })
    }

    pub async fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        let _guard = self.lock().await?;

        for write in &unit.writes {
            self.validate(write, &unit.writes)?;
        }

        for write in unit.writes {
            self.apply(write);
        }

        Ok(())
    }

    async fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        timeout(self.lock_timeout, self.commit_lock.lock())
            .await
            .map_err(|_| StoreError::Timeout(self.lock_timeout))
    }

    fn validate(&self, write: &Write, batch: &[Write]) -> Result<(), StoreError> {
        match write {
            Write::InsertShipment(record) => {
                if self.shipments.contains_key(&record.id) {
                    return Err(StoreError::AlreadyExists(record.id));
                }
            }
            Write::UpdateShipment { record, expected } => {
                let current = self.shipments.get(&record.id).map(|entry| entry.version);
                check_version(current, record.id, *expected)?;
            }
            Write::DeleteShipment { id, expected } => {
                let current = self.shipments.get(id).map(|entry| entry.version);
                check_version(current, *id, *expected)?;
            }
            Write::InsertDriver(record) => {
                if self.drivers.contains_key(&record.id) {
                    return Err(StoreError::AlreadyExists(record.id));
                }
                self.check_driver_unique(record, batch)?;
            }
            Write::UpdateDriver { record, expected } => {
                let current = self.drivers.get(&record.id).map(|entry| entry.version);
                check_version(current, record.id, *expected)?;
                self.check_driver_unique(record, batch)?;
            }
            Write::DeleteDriver { id, expected } => {
                let current = self.drivers.get(id).map(|entry| entry.version);
                check_version(current, *id, *expected)?;
            }
        }

        Ok(())
    }

    fn check_driver_unique(&self, record: &Driver, batch: &[Write]) -> Result<(), StoreError> {
        let clashes = |other: &Driver| {
            other.id != record.id
                && (other.email == record.email || other.license_number == record.license_number)
        };

        let stored_clash = self.drivers.iter().any(|entry| clashes(&entry.value().record));
        let batch_clash = batch.iter().any(|write| match write {
            Write::InsertDriver(other) | Write::UpdateDriver { record: other, .. } => clashes(other),
            _ => false,
        });

        if stored_clash || batch_clash {
            return Err(StoreError::DuplicateDriver {
                email: record.email.clone(),
                license_number: record.license_number.clone(),
            });
        }

        Ok(())
    }

    fn apply(&self, write: Write) {
        match write {
            Write::InsertShipment(record) => {
                self.shipments.insert(record.id, Versioned { record, version: 1 });
            }
            Write::UpdateShipment { record, expected } => {
                self.shipments.insert(
                    record.id,
                    Versioned {
                        record,
                        version: expected + 1,
                    },
                );
            }
            Write::DeleteShipment { id, .. } => {
                self.shipments.remove(&id);
            }
            Write::InsertDriver(record) => {
                self.drivers.insert(record.id, Versioned { record, version: 1 });
            }
            Write::UpdateDriver { record, expected } => {
                self.drivers.insert(
                    record.id,
                    Versioned {
                        record,
                        version: expected + 1,
                    },
                );
            }
            Write::DeleteDriver { id, .. } => {
                self.drivers.remove(&id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn hold_commit_lock(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().await
    }
}

fn check_version(current: Option<u64>, id: Uuid, expected: u64) -> Result<(), StoreError> {
    match current {
        None => Err(StoreError::Missing(id)),
        Some(version) if version != expected => Err(StoreError::VersionConflict(id)),
        Some(_) => Ok(()),
    }
}
