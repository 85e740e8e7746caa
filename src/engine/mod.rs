//! Consistency engine for shipments and drivers.
//!
//! Each public operation loads the records it touches, applies the
//! lifecycle and assignment rules to private copies, and commits every
//! resulting write as one [`UnitOfWork`]. A commit that loses a version race
//! is re-run from fresh reads; anything else is reported to the caller as is.

pub mod assignment;
pub mod dashboard;
pub mod identifier;
pub mod lifecycle;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::assignment::LinkViolation;
use crate::engine::dashboard::Dashboard;
use crate::engine::lifecycle::Transition;
use crate::error::{EngineError, ErrorKind};
use crate::models::driver::{Driver, DriverUpdate, NewDriver};
use crate::models::event::{ShipmentEvent, ShipmentEventKind};
use crate::models::filter::{DriverFilter, ShipmentFilter};
use crate::models::shipment::{NewShipment, Shipment, ShipmentCode, ShipmentStatus, ShipmentUpdate};
use crate::observability::metrics::Metrics;
use crate::store::{Store, UnitOfWork, Versioned};

pub struct ConsistencyEngine {
    store: Arc<Store>,
    commit_retries: u32,
    events_tx: broadcast::Sender<ShipmentEvent>,
    metrics: Metrics,
}

impl ConsistencyEngine {
    pub fn new(
        store: Arc<Store>,
        commit_retries: u32,
        events_tx: broadcast::Sender<ShipmentEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            commit_retries,
            events_tx,
            metrics,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn create_shipment(
        &self,
        details: NewShipment,
        actor: &str,
    ) -> Result<Shipment, EngineError> {
        self.instrument("create_shipment", async {
            validate_new_shipment(&details)?;

            if let Some(driver_id) = details.driver_id {
                assignment::ensure_available(&self.load_driver(driver_id)?.record)?;
            }

            let code = identifier::next_code(&self.store);
            let (details, code) = (&details, &code);
            let shipment = self
                .with_retries(move || self.try_create_shipment(details, code, actor))
                .await?;

            info!(
                shipment_id = %shipment.id,
                code = %shipment.code,
                driver_id = ?shipment.driver,
                actor,
                "shipment created"
            );
            self.publish(ShipmentEventKind::Created, &shipment, None, actor);
            Ok(shipment)
        })
        .await
    }

    async fn try_create_shipment(
        &self,
        details: &NewShipment,
        code: &ShipmentCode,
        actor: &str,
    ) -> Result<Shipment, EngineError> {
        let now = Utc::now();
        let mut shipment = Shipment::new(code.clone(), details, actor, now);
        let mut unit = UnitOfWork::new();

        if let Some(driver_id) = details.driver_id {
            let mut driver = self.load_driver(driver_id)?;
            assignment::ensure_available(&driver.record)?;
            assignment::link(&mut shipment, &mut driver.record, now);
            unit.update_driver(driver.record, driver.version);
        }

        unit.insert_shipment(shipment.clone());
        self.store.commit(unit).await?;
        Ok(shipment)
    }

    pub async fn update_status(
        &self,
        shipment_id: Uuid,
        requested: &str,
        actor: &str,
    ) -> Result<Shipment, EngineError> {
        self.instrument("update_status", async {
            let status = lifecycle::parse_requested(requested)?;
            let (shipment, transition) = self
                .with_retries(move || self.try_update_status(shipment_id, status, actor))
                .await?;
            let released = transition.release;

            self.metrics
                .status_transitions_total
                .with_label_values(&[status.as_str()])
                .inc();
            info!(
                shipment_id = %shipment.id,
                from = %transition.from,
                status = %shipment.status,
                released_driver = ?released,
                actor,
                "shipment status updated"
            );
            self.publish(ShipmentEventKind::StatusChanged, &shipment, released, actor);
            Ok(shipment)
        })
        .await
    }

    async fn try_update_status(
        &self,
        shipment_id: Uuid,
        status: ShipmentStatus,
        actor: &str,
    ) -> Result<(Shipment, Transition), EngineError> {
        let mut shipment = self.load_shipment(shipment_id)?;
        let now = Utc::now();
        let transition = lifecycle::transition(&mut shipment.record, status, actor, now)?;

        let mut unit = UnitOfWork::new();
        if let Some(driver_id) = transition.release {
            self.stage_release(&mut unit, driver_id, shipment_id, now);
        }
        unit.update_shipment(shipment.record.clone(), shipment.version);

        self.store.commit(unit).await?;
        Ok((shipment.record, transition))
    }

    pub async fn assign_driver(
        &self,
        shipment_id: Uuid,
        driver_id: Uuid,
        actor: &str,
    ) -> Result<Shipment, EngineError> {
        self.instrument("assign_driver", async {
            let (shipment, released) = self
                .with_retries(move || self.try_assign_driver(shipment_id, driver_id))
                .await?;

            info!(
                shipment_id = %shipment.id,
                driver_id = %driver_id,
                released_driver = ?released,
                actor,
                "driver assigned"
            );
            self.publish(ShipmentEventKind::DriverAssigned, &shipment, released, actor);
            Ok(shipment)
        })
        .await
    }

    async fn try_assign_driver(
        &self,
        shipment_id: Uuid,
        driver_id: Uuid,
    ) -> Result<(Shipment, Option<Uuid>), EngineError> {
        let mut shipment = self.load_shipment(shipment_id)?;
        assignment::ensure_not_terminal(&shipment.record)?;

        let mut driver = self.load_driver(driver_id)?;
        assignment::ensure_available(&driver.record)?;

        let now = Utc::now();
        let mut unit = UnitOfWork::new();
        let released = shipment.record.driver;
        if let Some(previous) = released {
            self.stage_release(&mut unit, previous, shipment_id, now);
        }

        assignment::link(&mut shipment.record, &mut driver.record, now);
        unit.update_shipment(shipment.record.clone(), shipment.version)
            .update_driver(driver.record, driver.version);

        self.store.commit(unit).await?;
        Ok((shipment.record, released))
    }

    pub async fn delete_shipment(&self, shipment_id: Uuid, actor: &str) -> Result<(), EngineError> {
        self.instrument("delete_shipment", async {
            let shipment = self
                .with_retries(move || self.try_delete_shipment(shipment_id))
                .await?;

            info!(
                shipment_id = %shipment.id,
                code = %shipment.code,
                released_driver = ?shipment.driver,
                actor,
                "shipment deleted"
            );
            self.publish(ShipmentEventKind::Deleted, &shipment, shipment.driver, actor);
            Ok(())
        })
        .await
    }

    async fn try_delete_shipment(&self, shipment_id: Uuid) -> Result<Shipment, EngineError> {
        let shipment = self.load_shipment(shipment_id)?;
        let mut unit = UnitOfWork::new();

        if let Some(driver_id) = shipment.record.driver {
            self.stage_release(&mut unit, driver_id, shipment_id, Utc::now());
        }
        unit.delete_shipment(shipment_id, shipment.version);

        self.store.commit(unit).await?;
        Ok(shipment.record)
    }

    pub async fn update_shipment(
        &self,
        shipment_id: Uuid,
        update: ShipmentUpdate,
        actor: &str,
    ) -> Result<Shipment, EngineError> {
        self.instrument("update_shipment", async {
            validate_shipment_update(&update)?;
            let update = &update;
            let shipment = self
                .with_retries(move || async move {
                    let mut shipment = self.load_shipment(shipment_id)?;
                    assignment::ensure_not_terminal(&shipment.record)?;
                    shipment.record.apply_update(update, Utc::now());

                    let mut unit = UnitOfWork::new();
                    unit.update_shipment(shipment.record.clone(), shipment.version);
                    self.store.commit(unit).await?;
                    Ok(shipment.record)
                })
                .await?;

            debug!(shipment_id = %shipment.id, actor, "shipment details updated");
            self.publish(ShipmentEventKind::Updated, &shipment, None, actor);
            Ok(shipment)
        })
        .await
    }

    pub async fn create_driver(&self, details: NewDriver, actor: &str) -> Result<Driver, EngineError> {
        self.instrument("create_driver", async {
            validate_new_driver(&details)?;
            let driver = Driver::new(&details, Utc::now());

            let mut unit = UnitOfWork::new();
            unit.insert_driver(driver.clone());
            self.store.commit(unit).await?;

            info!(driver_id = %driver.id, actor, "driver created");
            Ok(driver)
        })
        .await
    }

    pub async fn update_driver(
        &self,
        driver_id: Uuid,
        update: DriverUpdate,
        actor: &str,
    ) -> Result<Driver, EngineError> {
        self.instrument("update_driver", async {
            validate_driver_update(&update)?;
            let update = &update;
            let driver = self
                .with_retries(move || async move {
                    let mut driver = self.load_driver(driver_id)?;
                    driver.record.apply_update(update, Utc::now());

                    let mut unit = UnitOfWork::new();
                    unit.update_driver(driver.record.clone(), driver.version);
                    self.store.commit(unit).await?;
                    Ok(driver.record)
                })
                .await?;

            debug!(driver_id = %driver.id, actor, "driver profile updated");
            Ok(driver)
        })
        .await
    }

    pub async fn delete_driver(&self, driver_id: Uuid, actor: &str) -> Result<(), EngineError> {
        self.instrument("delete_driver", async {
            self.with_retries(move || async move {
                let driver = self.load_driver(driver_id)?;
                assignment::ensure_deletable(&driver.record)?;

                let mut unit = UnitOfWork::new();
                unit.delete_driver(driver_id, driver.version);
                self.store.commit(unit).await?;
                Ok(())
            })
            .await?;

            info!(driver_id = %driver_id, actor, "driver deleted");
            Ok(())
        })
        .await
    }

    pub fn get_shipment(&self, shipment_id: Uuid) -> Result<Shipment, EngineError> {
        self.load_shipment(shipment_id).map(|shipment| shipment.record)
    }

    pub fn list_shipments(&self, filter: &ShipmentFilter) -> Vec<Shipment> {
        self.store.list_shipments(filter)
    }

    pub fn get_driver(&self, driver_id: Uuid) -> Result<Driver, EngineError> {
        self.load_driver(driver_id).map(|driver| driver.record)
    }

    pub fn list_drivers(&self, filter: &DriverFilter) -> Vec<Driver> {
        self.store.list_drivers(filter)
    }

    pub async fn dashboard(&self) -> Result<Dashboard, EngineError> {
        let snapshot = self.store.snapshot().await?;
        Ok(Dashboard::from_snapshot(&snapshot))
    }

    /// Every broken shipment/driver link in a consistent snapshot.
    pub async fn link_violations(&self) -> Result<Vec<LinkViolation>, EngineError> {
        let snapshot = self.store.snapshot().await?;
        Ok(assignment::verify_links(&snapshot.shipments, &snapshot.drivers))
    }

    fn load_shipment(&self, shipment_id: Uuid) -> Result<Versioned<Shipment>, EngineError> {
        self.store
            .shipment(&shipment_id)
            .ok_or(EngineError::ShipmentNotFound(shipment_id))
    }

    fn load_driver(&self, driver_id: Uuid) -> Result<Versioned<Driver>, EngineError> {
        self.store
            .driver(&driver_id)
            .ok_or(EngineError::DriverNotFound(driver_id))
    }

    /// Stages the release of `driver_id` if it still points at `shipment_id`.
    fn stage_release(
        &self,
        unit: &mut UnitOfWork,
        driver_id: Uuid,
        shipment_id: Uuid,
        now: chrono::DateTime<Utc>,
    ) {
        match self.store.driver(&driver_id) {
            Some(mut driver) if driver.record.current_shipment == Some(shipment_id) => {
                assignment::release(&mut driver.record, now);
                unit.update_driver(driver.record, driver.version);
            }
            Some(_) => {
                warn!(
                    driver_id = %driver_id,
                    shipment_id = %shipment_id,
                    "driver no longer points at shipment; leaving it untouched"
                );
            }
            None => {
                warn!(driver_id = %driver_id, shipment_id = %shipment_id, "linked driver is missing");
            }
        }
    }

    async fn with_retries<T, F, Fut>(&self, mut attempt: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable_conflict() && retries < self.commit_retries => {
                    retries += 1;
                    self.metrics.commit_retries_total.inc();
                    debug!(retries, error = %err, "re-running unit of work after concurrent change");
                }
                result => return result,
            }
        }
    }

    async fn instrument<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let start = Instant::now();
        let result = work.await;
        let elapsed = start.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => match err.kind() {
                ErrorKind::NotFound => "not_found",
                ErrorKind::Conflict => "conflict",
                ErrorKind::InvalidRequest => "invalid_request",
                ErrorKind::Transient => "transient",
            },
        };

        self.metrics
            .operation_latency_seconds
            .with_label_values(&[operation])
            .observe(elapsed);
        self.metrics
            .operations_total
            .with_label_values(&[operation, outcome])
            .inc();

        if let Err(err) = &result {
            if err.kind() == ErrorKind::Transient {
                warn!(operation, error = %err, "operation failed; nothing was applied");
            } else {
                debug!(operation, error = %err, "operation rejected");
            }
        }

        result
    }

    fn publish(
        &self,
        kind: ShipmentEventKind,
        shipment: &Shipment,
        released_driver: Option<Uuid>,
        actor: &str,
    ) {
        let event = ShipmentEvent::new(kind, shipment, released_driver, actor, Utc::now());
        let _ = self.events_tx.send(event);
    }
}

fn require_text(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_weight(weight: Option<f64>) -> Result<(), EngineError> {
    match weight {
        Some(weight) if !weight.is_finite() || weight < 0.0 => Err(EngineError::InvalidInput(
            "weight cannot be negative".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_new_shipment(details: &NewShipment) -> Result<(), EngineError> {
    require_text("name", &details.name)?;
    require_text("origin", &details.origin)?;
    require_text("destination", &details.destination)?;
    require_weight(details.weight)
}

fn validate_shipment_update(update: &ShipmentUpdate) -> Result<(), EngineError> {
    for (field, value) in [
        ("name", &update.name),
        ("origin", &update.origin),
        ("destination", &update.destination),
    ] {
        if let Some(value) = value {
            require_text(field, value)?;
        }
    }
    require_weight(update.weight)
}

fn validate_new_driver(details: &NewDriver) -> Result<(), EngineError> {
    require_text("name", &details.name)?;
    require_text("email", &details.email)?;
    require_text("phone", &details.phone)?;
    require_text("license_number", &details.license_number)
}

fn validate_driver_update(update: &DriverUpdate) -> Result<(), EngineError> {
    for (field, value) in [
        ("name", &update.name),
        ("email", &update.email),
        ("phone", &update.phone),
        ("license_number", &update.license_number),
    ] {
        if let Some(value) = value {
            require_text(field, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
