//! Satellite fleet coordination.
//!
//! The coordinator owns all satellite runtime state: it partitions the
//! endpoint set into per-satellite assignments, tracks liveness by
//! heartbeat and ingests batched results pushed by satellites. A
//! periodic sweeper demotes satellites whose heartbeat has gone stale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigManager, EndpointConfig};
use crate::probe::ProbeResult;
use crate::storage::MetricStore;

/// How often the liveness sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Heartbeats older than this mark the satellite offline.
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(90);

/// Derived liveness of a satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SatelliteStatus {
    Online,
    Offline,
    /// Present in config but never heartbeated since this master
    /// started.
    Unknown,
}

/// Runtime state of one satellite; exclusively owned by the
/// coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct SatelliteState {
    pub id: String,
    pub name: String,
    pub status: SatelliteStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

pub struct FleetCoordinator {
    config: Arc<ConfigManager>,
    store: Arc<dyn MetricStore>,
    satellites: Mutex<HashMap<String, SatelliteState>>,
    offline_threshold: Duration,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FleetCoordinator {
    pub fn new(config: Arc<ConfigManager>, store: Arc<dyn MetricStore>) -> Arc<Self> {
        Self::with_offline_threshold(config, store, DEFAULT_OFFLINE_THRESHOLD)
    }

    pub fn with_offline_threshold(
        config: Arc<ConfigManager>,
        store: Arc<dyn MetricStore>,
        offline_threshold: Duration,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let coordinator = Arc::new(Self {
            config: Arc::clone(&config),
            store,
            satellites: Mutex::new(HashMap::new()),
            offline_threshold,
            shutdown,
            task: Mutex::new(None),
        });
        coordinator.refresh(&config.snapshot());
        coordinator
    }

    /// Start the liveness sweeper and follow config changes.
    pub fn start(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        let mut changes = self.config.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => coordinator.sweep(),
                    recv = changes.recv() => match recv {
                        Ok(snapshot) => coordinator.refresh(&snapshot),
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            coordinator.refresh(&coordinator.config.snapshot());
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("fleet coordinator task stopped");
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Whether the id belongs to a configured satellite.
    pub fn is_known(&self, satellite_id: &str) -> bool {
        self.satellites
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(satellite_id)
    }

    /// Record a heartbeat. Returns false for ids not in the config,
    /// which are ignored.
    pub fn record_heartbeat(&self, satellite_id: &str) -> bool {
        let mut satellites = self
            .satellites
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match satellites.get_mut(satellite_id) {
            Some(state) => {
                state.last_heartbeat = Some(Utc::now());
                state.status = SatelliteStatus::Online;
                true
            }
            None => {
                debug!(satellite = %satellite_id, "heartbeat from unknown satellite ignored");
                false
            }
        }
    }

    /// The endpoints served to a satellite: every endpoint whose
    /// assignment names it (or the wildcard). Master-local endpoints are
    /// never served.
    pub fn assignment_for(&self, satellite_id: &str) -> Vec<EndpointConfig> {
        self.config
            .snapshot()
            .endpoints
            .iter()
            .filter(|e| e.assigned_to(satellite_id))
            .cloned()
            .collect()
    }

    /// Ingest a batch of results pushed by a satellite. Each result is
    /// stamped with the authenticated satellite id regardless of what
    /// the sender set. Individual write failures are logged and must not
    /// poison the rest of the batch; returns the number of stored
    /// results.
    pub async fn ingest(&self, satellite_id: &str, results: Vec<ProbeResult>) -> usize {
        let mut stored = 0;
        for mut result in results {
            result.satellite_id = satellite_id.to_string();
            match self.store.write_result(&result).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(
                        satellite = %satellite_id,
                        endpoint = %result.endpoint_id,
                        "failed to store satellite result: {e}"
                    );
                }
            }
        }
        debug!(satellite = %satellite_id, stored, "ingested satellite results");
        stored
    }

    /// All satellite states, ordered by id.
    pub fn states(&self) -> Vec<SatelliteState> {
        let satellites = self
            .satellites
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<SatelliteState> = satellites.values().cloned().collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    /// Demote online satellites whose heartbeat is older than the
    /// threshold.
    fn sweep(&self) {
        let threshold = chrono::Duration::from_std(self.offline_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(90));
        let now = Utc::now();
        let mut satellites = self
            .satellites
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for state in satellites.values_mut() {
            if state.status != SatelliteStatus::Online {
                continue;
            }
            if let Some(beat) = state.last_heartbeat {
                if now - beat > threshold {
                    info!(satellite = %state.id, "satellite went offline");
                    state.status = SatelliteStatus::Offline;
                }
            }
        }
    }

    /// Sync the state map with a snapshot: new satellites appear as
    /// unknown, removed ones are dropped, names follow the config.
    fn refresh(&self, snapshot: &Config) {
        let mut satellites = self
            .satellites
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        satellites.retain(|id, _| snapshot.satellites.iter().any(|s| &s.id == id));
        for sat in &snapshot.satellites {
            match satellites.get_mut(&sat.id) {
                Some(state) => state.name = sat.name.clone(),
                None => {
                    satellites.insert(
                        sat.id.clone(),
                        SatelliteState {
                            id: sat.id.clone(),
                            name: sat.name.clone(),
                            status: SatelliteStatus::Unknown,
                            last_heartbeat: None,
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SatelliteConfig;
    use crate::storage::MemoryStore;

    fn coordinator_with(satellites: &[&str]) -> Arc<FleetCoordinator> {
        let file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        let yaml = format!(
            "satellites:\n{}",
            satellites
                .iter()
                .map(|id| format!("  - id: {id}\n"))
                .collect::<String>()
        );
        std::fs::write(file.path(), yaml).unwrap();
        let config = ConfigManager::load(file.path()).unwrap();
        FleetCoordinator::new(config, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn heartbeat_marks_online_and_ignores_unknown() {
        let fleet = coordinator_with(&["sat-a"]);
        assert!(fleet.record_heartbeat("sat-a"));
        assert!(!fleet.record_heartbeat("sat-b"));

        let states = fleet.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status, SatelliteStatus::Online);
        assert!(states[0].last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn satellites_start_unknown_until_first_heartbeat() {
        let fleet = coordinator_with(&["sat-a"]);
        assert_eq!(fleet.states()[0].status, SatelliteStatus::Unknown);

        fleet.sweep();
        assert_eq!(
            fleet.states()[0].status,
            SatelliteStatus::Unknown,
            "sweeper must not demote satellites that never heartbeated"
        );
    }

    #[tokio::test]
    async fn sweep_marks_stale_satellites_offline() {
        let file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        std::fs::write(file.path(), "satellites:\n  - id: sat-a\n").unwrap();
        let config = ConfigManager::load(file.path()).unwrap();
        let fleet = FleetCoordinator::with_offline_threshold(
            config,
            Arc::new(MemoryStore::new()),
            Duration::ZERO,
        );

        fleet.record_heartbeat("sat-a");
        tokio::time::sleep(Duration::from_millis(10)).await;
        fleet.sweep();
        assert_eq!(fleet.states()[0].status, SatelliteStatus::Offline);

        // A fresh heartbeat brings it back.
        fleet.record_heartbeat("sat-a");
        assert_eq!(fleet.states()[0].status, SatelliteStatus::Online);
    }

    #[tokio::test]
    async fn refresh_tracks_config_membership() {
        let fleet = coordinator_with(&["sat-a", "sat-b"]);
        assert_eq!(fleet.states().len(), 2);

        let snapshot = Config {
            satellites: vec![SatelliteConfig {
                id: "sat-b".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        fleet.refresh(&snapshot);

        let states = fleet.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].id, "sat-b");
    }

    #[tokio::test]
    async fn ingest_stamps_satellite_id() {
        let store = Arc::new(MemoryStore::new());
        let file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        std::fs::write(file.path(), "satellites:\n  - id: sat-a\n").unwrap();
        let config = ConfigManager::load(file.path()).unwrap();
        let fleet = FleetCoordinator::new(config, Arc::clone(&store) as Arc<dyn MetricStore>);

        let mut result = ProbeResult::new(&EndpointConfig {
            id: "e1".to_string(),
            url: "http://example.com".to_string(),
            ..Default::default()
        });
        result.satellite_id = "spoofed".to_string();
        result.success = true;

        let stored = fleet.ingest("sat-a", vec![result]).await;
        assert_eq!(stored, 1);

        let history = store
            .query_history(
                "e1",
                Utc::now() - chrono::Duration::minutes(1),
                Utc::now() + chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        assert_eq!(history[0].satellite_id, "sat-a");
    }
}
