use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use super::ConsistencyEngine;
use crate::engine::lifecycle::history_is_well_formed;
use crate::error::{EngineError, ErrorKind, StoreError};
use crate::models::driver::{DriverUpdate, NewDriver, VehicleType};
use crate::models::event::ShipmentEventKind;
use crate::models::filter::{DriverFilter, ShipmentFilter};
use crate::models::shipment::{NewShipment, ShipmentStatus, ShipmentUpdate};
use crate::observability::metrics::Metrics;
use crate::store::Store;

const ACTOR: &str = "dispatcher";

fn engine_with_timeout(timeout: Duration) -> ConsistencyEngine {
    let (events_tx, _) = broadcast::channel(64);
    ConsistencyEngine::new(Arc::new(Store::new(timeout)), 3, events_tx, Metrics::new())
}

fn engine() -> ConsistencyEngine {
    engine_with_timeout(Duration::from_millis(500))
}

fn new_shipment(driver_id: Option<Uuid>) -> NewShipment {
    NewShipment {
        name: "Office chairs".to_string(),
        origin: "Rotterdam".to_string(),
        destination: "Utrecht".to_string(),
        weight: Some(120.5),
        description: Some("12 units".to_string()),
        driver_id,
    }
}

async fn new_driver(engine: &ConsistencyEngine, seed: u32) -> Uuid {
    engine
        .create_driver(
            NewDriver {
                name: format!("Driver {seed}"),
                email: format!("Driver{seed}@Fleet.io"),
                phone: format!("55501{seed:05}"),
                license_number: format!("lic-{seed}"),
                vehicle_type: VehicleType::Van,
            },
            ACTOR,
        )
        .await
        .unwrap()
        .id
}

async fn assert_links_consistent(engine: &ConsistencyEngine) {
    assert_eq!(engine.link_violations().await.unwrap(), vec![]);
}

#[tokio::test]
async fn full_lifecycle_scenario() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;

    let shipment = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Pending);
    assert_eq!(shipment.code.as_str(), "SHP000001");
    assert_eq!(shipment.status_history.len(), 1);
    assert_eq!(shipment.status_history[0].status, ShipmentStatus::Pending);
    assert_eq!(shipment.driver, None);

    let assigned = engine.assign_driver(shipment.id, d1, ACTOR).await.unwrap();
    assert_eq!(assigned.driver, Some(d1));
    let driver = engine.get_driver(d1).unwrap();
    assert!(!driver.is_available);
    assert_eq!(driver.current_shipment, Some(shipment.id));
    assert_links_consistent(&engine).await;

    let in_transit = engine
        .update_status(shipment.id, "In Transit", ACTOR)
        .await
        .unwrap();
    let statuses: Vec<ShipmentStatus> = in_transit
        .status_history
        .iter()
        .map(|change| change.status)
        .collect();
    assert_eq!(statuses, [ShipmentStatus::Pending, ShipmentStatus::InTransit]);

    let delivered = engine
        .update_status(shipment.id, "Delivered", ACTOR)
        .await
        .unwrap();
    assert_eq!(delivered.status, ShipmentStatus::Delivered);
    assert_eq!(delivered.status_history.len(), 3);
    assert!(delivered.delivered_at.is_some());
    assert_eq!(delivered.delivered_by, Some(d1));
    assert_eq!(delivered.driver, None);
    assert!(history_is_well_formed(&delivered));

    let driver = engine.get_driver(d1).unwrap();
    assert!(driver.is_available);
    assert_eq!(driver.current_shipment, None);
    assert_links_consistent(&engine).await;
}

#[tokio::test]
async fn repeated_status_is_rejected() {
    let engine = engine();
    let shipment = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();

    let err = engine
        .update_status(shipment.id, "Pending", ACTOR)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NoOpTransition(ShipmentStatus::Pending));
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn skipping_in_transit_is_rejected_without_side_effects() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap();

    let err = engine
        .update_status(shipment.id, "Delivered", ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IllegalTransition { .. }));

    let stored = engine.get_shipment(shipment.id).unwrap();
    assert_eq!(stored.status, ShipmentStatus::Pending);
    assert_eq!(stored.status_history.len(), 1);
    assert!(stored.delivered_at.is_none());
    assert!(!engine.get_driver(d1).unwrap().is_available);
}

#[tokio::test]
async fn unknown_status_is_rejected_before_lookup() {
    let engine = engine();
    let err = engine
        .update_status(Uuid::new_v4(), "Lost", ACTOR)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidStatus("Lost".to_string()));

    let err = engine
        .update_status(Uuid::new_v4(), "In Transit", ACTOR)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn assigning_busy_driver_changes_nothing() {
    let engine = engine();
    let busy = new_driver(&engine, 1).await;
    let first = engine
        .create_shipment(new_shipment(Some(busy)), ACTOR)
        .await
        .unwrap();
    let second = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();

    let err = engine.assign_driver(second.id, busy, ACTOR).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::DriverUnavailable {
            driver_id: busy,
            current_shipment: Some(first.id),
        }
    );

    assert_eq!(engine.get_shipment(second.id).unwrap().driver, None);
    assert_eq!(engine.get_driver(busy).unwrap().current_shipment, Some(first.id));
    assert_links_consistent(&engine).await;
}

#[tokio::test]
async fn assigning_unknown_records_changes_nothing() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();

    let ghost_shipment = Uuid::new_v4();
    assert_eq!(
        engine.assign_driver(ghost_shipment, d1, ACTOR).await.unwrap_err(),
        EngineError::ShipmentNotFound(ghost_shipment)
    );
    let driver = engine.get_driver(d1).unwrap();
    assert!(driver.is_available);
    assert_eq!(driver.current_shipment, None);

    let ghost_driver = Uuid::new_v4();
    let err = engine
        .assign_driver(shipment.id, ghost_driver, ACTOR)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::DriverNotFound(ghost_driver));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let stored = engine.get_shipment(shipment.id).unwrap();
    assert_eq!(stored.driver, None);
    assert_eq!(stored.updated_at, shipment.updated_at);
    assert_links_consistent(&engine).await;
}

#[tokio::test]
async fn reassigning_current_driver_is_rejected() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap();

    let err = engine.assign_driver(shipment.id, d1, ACTOR).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::DriverUnavailable {
            driver_id: d1,
            current_shipment: Some(shipment.id),
        }
    );

    let stored = engine.get_shipment(shipment.id).unwrap();
    assert_eq!(stored.driver, Some(d1));
    assert_eq!(stored.updated_at, shipment.updated_at);
    let driver = engine.get_driver(d1).unwrap();
    assert!(!driver.is_available);
    assert_eq!(driver.current_shipment, Some(shipment.id));
    assert_links_consistent(&engine).await;
}

#[tokio::test]
async fn padded_status_is_rejected() {
    let engine = engine();
    let shipment = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();

    let err = engine
        .update_status(shipment.id, " In Transit ", ACTOR)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidStatus(" In Transit ".to_string()));
    assert_eq!(
        engine.get_shipment(shipment.id).unwrap().status,
        ShipmentStatus::Pending
    );
}

#[tokio::test]
async fn creation_with_unknown_or_busy_driver_fails() {
    let engine = engine();
    let ghost = Uuid::new_v4();
    assert_eq!(
        engine
            .create_shipment(new_shipment(Some(ghost)), ACTOR)
            .await
            .unwrap_err(),
        EngineError::DriverNotFound(ghost)
    );

    let d1 = new_driver(&engine, 1).await;
    engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap();
    let err = engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DriverUnavailable { .. }));
    assert_eq!(engine.store().shipment_count(), 1);
}

#[tokio::test]
async fn reassignment_releases_previous_driver() {
    let engine = engine();
    let a = new_driver(&engine, 1).await;
    let b = new_driver(&engine, 2).await;
    let shipment = engine
        .create_shipment(new_shipment(Some(a)), ACTOR)
        .await
        .unwrap();

    let reassigned = engine.assign_driver(shipment.id, b, ACTOR).await.unwrap();
    assert_eq!(reassigned.driver, Some(b));

    let a = engine.get_driver(a).unwrap();
    assert!(a.is_available);
    assert_eq!(a.current_shipment, None);

    let b = engine.get_driver(b).unwrap();
    assert!(!b.is_available);
    assert_eq!(b.current_shipment, Some(shipment.id));
    assert_links_consistent(&engine).await;
}

#[tokio::test]
async fn delivered_shipment_rejects_assignment_and_edits() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();
    engine.update_status(shipment.id, "In Transit", ACTOR).await.unwrap();
    engine.update_status(shipment.id, "Delivered", ACTOR).await.unwrap();

    let err = engine.assign_driver(shipment.id, d1, ACTOR).await.unwrap_err();
    assert!(matches!(err, EngineError::ShipmentTerminal { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(engine.get_driver(d1).unwrap().is_available);

    let err = engine
        .update_shipment(
            shipment.id,
            ShipmentUpdate {
                name: Some("Renamed".to_string()),
                ..ShipmentUpdate::default()
            },
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ShipmentTerminal { .. }));
}

#[tokio::test]
async fn deleting_shipment_frees_its_driver() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap();

    engine.delete_shipment(shipment.id, ACTOR).await.unwrap();

    assert_eq!(
        engine.get_shipment(shipment.id).unwrap_err(),
        EngineError::ShipmentNotFound(shipment.id)
    );
    let driver = engine.get_driver(d1).unwrap();
    assert!(driver.is_available);
    assert_eq!(driver.current_shipment, None);
    assert_links_consistent(&engine).await;

    assert_eq!(
        engine.delete_shipment(shipment.id, ACTOR).await.unwrap_err(),
        EngineError::ShipmentNotFound(shipment.id)
    );
}

#[tokio::test]
async fn linked_driver_cannot_be_deleted() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap();

    let err = engine.delete_driver(d1, ACTOR).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::DriverAssigned {
            driver_id: d1,
            shipment_id: shipment.id,
        }
    );
    assert!(engine.get_driver(d1).is_ok());

    engine.update_status(shipment.id, "In Transit", ACTOR).await.unwrap();
    engine.update_status(shipment.id, "Delivered", ACTOR).await.unwrap();
    engine.delete_driver(d1, ACTOR).await.unwrap();
    assert_eq!(
        engine.get_driver(d1).unwrap_err(),
        EngineError::DriverNotFound(d1)
    );
    assert_eq!(
        engine.delete_driver(d1, ACTOR).await.unwrap_err(),
        EngineError::DriverNotFound(d1)
    );

    let ghost = Uuid::new_v4();
    let err = engine.delete_driver(ghost, ACTOR).await.unwrap_err();
    assert_eq!(err, EngineError::DriverNotFound(ghost));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(engine.store().driver_count(), 0);
}

#[tokio::test]
async fn duplicate_driver_identity_is_a_conflict() {
    let engine = engine();
    new_driver(&engine, 1).await;

    let err = engine
        .create_driver(
            NewDriver {
                name: "Copycat".to_string(),
                email: "driver1@fleet.io".to_string(),
                phone: "5550199999".to_string(),
                license_number: "OTHER-1".to_string(),
                vehicle_type: VehicleType::Bike,
            },
            ACTOR,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateDriver { .. }));
}

#[tokio::test]
async fn driver_profile_update_keeps_assignment_state() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap();

    let updated = engine
        .update_driver(
            d1,
            DriverUpdate {
                vehicle_type: Some(VehicleType::Truck),
                email: Some("  NEW@fleet.io ".to_string()),
                ..DriverUpdate::default()
            },
            ACTOR,
        )
        .await
        .unwrap();

    assert_eq!(updated.vehicle_type, VehicleType::Truck);
    assert_eq!(updated.email, "new@fleet.io");
    assert!(!updated.is_available);
    assert_eq!(updated.current_shipment, Some(shipment.id));
}

#[tokio::test]
async fn store_timeout_is_transient_and_applies_nothing() {
    let engine = engine_with_timeout(Duration::from_millis(20));
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();

    let held = engine.store().hold_commit_lock().await;
    let err = engine.assign_driver(shipment.id, d1, ACTOR).await.unwrap_err();
    drop(held);

    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(
        err,
        EngineError::Transient(StoreError::Timeout(Duration::from_millis(20)))
    );
    assert_eq!(engine.get_shipment(shipment.id).unwrap().driver, None);
    assert!(engine.get_driver(d1).unwrap().is_available);

    engine.assign_driver(shipment.id, d1, ACTOR).await.unwrap();
    assert_links_consistent(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_assignments_link_driver_once() {
    let engine = Arc::new(engine());
    let d1 = new_driver(&engine, 1).await;

    let mut shipments = Vec::new();
    for _ in 0..8 {
        shipments.push(engine.create_shipment(new_shipment(None), ACTOR).await.unwrap().id);
    }

    let mut handles = Vec::new();
    for shipment_id in shipments {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.assign_driver(shipment_id, d1, ACTOR).await
        }));
    }

    let mut linked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => linked += 1,
            Err(err) => assert!(matches!(err, EngineError::DriverUnavailable { .. })),
        }
    }

    assert_eq!(linked, 1);
    let with_driver = engine.list_shipments(&ShipmentFilter {
        driver: Some(d1),
        ..ShipmentFilter::default()
    });
    assert_eq!(with_driver.len(), 1);
    assert_links_consistent(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_get_distinct_codes() {
    let engine = Arc::new(engine());
    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.create_shipment(new_shipment(None), ACTOR).await.unwrap().code
        }));
    }

    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await.unwrap());
    }
    codes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    codes.dedup();
    assert_eq!(codes.len(), 20);
    assert_eq!(codes[0].as_str(), "SHP000001");
    assert_eq!(codes[19].as_str(), "SHP000020");
}

#[tokio::test]
async fn committed_changes_are_published() {
    let (events_tx, mut events_rx) = broadcast::channel(16);
    let engine = ConsistencyEngine::new(
        Arc::new(Store::new(Duration::from_millis(500))),
        3,
        events_tx,
        Metrics::new(),
    );
    let d1 = new_driver(&engine, 1).await;
    let shipment = engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();
    engine.assign_driver(shipment.id, d1, ACTOR).await.unwrap();
    assert!(engine.update_status(shipment.id, "Delivered", ACTOR).await.is_err());

    let created = events_rx.recv().await.unwrap();
    assert_eq!(created.kind, ShipmentEventKind::Created);
    assert_eq!(created.shipment_code, shipment.code);

    let assigned = events_rx.recv().await.unwrap();
    assert_eq!(assigned.kind, ShipmentEventKind::DriverAssigned);
    assert_eq!(assigned.driver, Some(d1));
    assert_eq!(assigned.actor, ACTOR);

    assert!(events_rx.try_recv().is_err());
}

#[tokio::test]
async fn dashboard_counts_by_status_and_availability() {
    let engine = engine();
    let d1 = new_driver(&engine, 1).await;
    new_driver(&engine, 2).await;

    let first = engine
        .create_shipment(new_shipment(Some(d1)), ACTOR)
        .await
        .unwrap();
    engine.create_shipment(new_shipment(None), ACTOR).await.unwrap();
    engine.update_status(first.id, "In Transit", ACTOR).await.unwrap();

    let dashboard = engine.dashboard().await.unwrap();
    assert_eq!(dashboard.shipments.total, 2);
    assert_eq!(dashboard.shipments.pending, 1);
    assert_eq!(dashboard.shipments.in_transit, 1);
    assert_eq!(dashboard.shipments.delivered, 0);
    assert_eq!(dashboard.drivers.total, 2);
    assert_eq!(dashboard.drivers.available, 1);
    assert_eq!(dashboard.drivers.busy, 1);
    assert_eq!(dashboard.recent_shipments.len(), 2);

    let available = engine.list_drivers(&DriverFilter {
        available: Some(true),
    });
    assert_eq!(available.len(), 1);
}

#[tokio::test]
async fn blank_required_fields_are_rejected() {
    let engine = engine();
    let mut details = new_shipment(None);
    details.origin = "   ".to_string();

    let err = engine.create_shipment(details, ACTOR).await.unwrap_err();
    assert_eq!(err, EngineError::InvalidInput("origin cannot be empty".to_string()));
    assert_eq!(engine.store().shipment_count(), 0);
}
