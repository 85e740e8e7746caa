use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::ConsistencyEngine;
use crate::models::event::ShipmentEvent;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub engine: ConsistencyEngine,
    pub shipment_events_tx: broadcast::Sender<ShipmentEvent>,
    pub metrics: Metrics,
    pub default_actor: String,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let (shipment_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();
        let store = Arc::new(Store::new(config.store_timeout));

        Self {
            engine: ConsistencyEngine::new(
                store,
                config.commit_retries,
                shipment_events_tx.clone(),
                metrics.clone(),
            ),
            shipment_events_tx,
            metrics,
            default_actor: config.default_actor.clone(),
        }
    }
}
