//! Shared state passed to all API handlers.

use std::sync::Arc;

use crate::config::ConfigManager;
use crate::fleet::FleetCoordinator;
use crate::storage::MetricStore;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ConfigManager>,
    pub store: Arc<dyn MetricStore>,
    pub fleet: Arc<FleetCoordinator>,
}

impl ApiState {
    pub fn new(
        config: Arc<ConfigManager>,
        store: Arc<dyn MetricStore>,
        fleet: Arc<FleetCoordinator>,
    ) -> Self {
        Self {
            config,
            store,
            fleet,
        }
    }
}
