//! Per-endpoint probe scheduling.
//!
//! The scheduler materialises the current config snapshot into one
//! worker task per master-local endpoint and converges the running set
//! on every snapshot change. Reconciliations run on a single
//! subscription task, so they never interleave and no two workers ever
//! coexist for the same endpoint id. Endpoints assigned to satellites
//! are never scheduled here; they only appear in the per-satellite
//! config served by the fleet API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alerting::{AlertEvaluator, WebhookProvider};
use crate::config::{Config, ConfigManager, EndpointConfig};
use crate::probe::Checker;
use crate::storage::MetricStore;

/// Joins on cancelled workers are bounded by this deadline; stragglers
/// are abandoned (their task exits once the in-flight probe returns).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Worker {
    /// Endpoint with interval and timeout resolved against the global
    /// defaults; the reconcile diff compares against this.
    endpoint: EndpointConfig,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The sole spawner of probes on the master.
pub struct Scheduler {
    config: Arc<ConfigManager>,
    checker: Arc<Checker>,
    store: Arc<dyn MetricStore>,
    evaluator: Arc<AlertEvaluator>,
    workers: Mutex<HashMap<String, Worker>>,
    shutdown: watch::Sender<bool>,
    subscription: StdMutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Scheduler with the default probe engine and a webhook-capable
    /// alert evaluator.
    pub fn new(config: Arc<ConfigManager>, store: Arc<dyn MetricStore>) -> Arc<Self> {
        let evaluator = Arc::new(AlertEvaluator::new(Arc::clone(&config)));
        evaluator.register_provider("webhook", Arc::new(WebhookProvider::new()));
        Self::with_parts(config, store, Arc::new(Checker::new()), evaluator)
    }

    pub fn with_parts(
        config: Arc<ConfigManager>,
        store: Arc<dyn MetricStore>,
        checker: Arc<Checker>,
        evaluator: Arc<AlertEvaluator>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            checker,
            store,
            evaluator,
            workers: Mutex::new(HashMap::new()),
            shutdown,
            subscription: StdMutex::new(None),
        })
    }

    /// Start workers for the current snapshot and follow config changes.
    pub async fn start(self: &Arc<Self>) {
        let mut changes = self.config.subscribe();
        self.reconcile(self.config.snapshot()).await;

        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    recv = changes.recv() => match recv {
                        Ok(snapshot) => scheduler.reconcile(snapshot).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("scheduler lagged {skipped} config updates, reconciling to latest");
                            scheduler.reconcile(scheduler.config.snapshot()).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("scheduler subscription task stopped");
        });
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Cancel all workers and join them within the grace period.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let drained: Vec<Worker> = {
            let mut workers = self.workers.lock().await;
            workers.drain().map(|(_, worker)| worker).collect()
        };
        for worker in drained {
            stop_worker(worker).await;
        }
        info!("scheduler stopped");
    }

    /// Endpoint ids with a running worker. Primarily for tests and
    /// introspection.
    pub async fn worker_endpoints(&self) -> Vec<String> {
        let workers = self.workers.lock().await;
        let mut ids: Vec<String> = workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Converge the running workers to `snapshot`: keep unchanged
    /// endpoints, cancel removed or mutated ones (joining before their
    /// replacement starts), spawn added ones.
    async fn reconcile(&self, snapshot: Arc<Config>) {
        let desired: HashMap<String, EndpointConfig> = snapshot
            .endpoints
            .iter()
            .filter(|e| e.is_master_local())
            .map(|e| (e.id.clone(), e.resolved(&snapshot.global)))
            .collect();

        let mut workers = self.workers.lock().await;

        let stale: Vec<String> = workers
            .iter()
            .filter(|(id, worker)| desired.get(id.as_str()) != Some(&worker.endpoint))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(worker) = workers.remove(&id) {
                debug!(endpoint = %id, "stopping worker");
                stop_worker(worker).await;
            }
        }

        for (id, endpoint) in desired {
            if !workers.contains_key(&id) {
                debug!(endpoint = %id, interval = ?endpoint.interval, "starting worker");
                let worker = self.spawn_worker(endpoint);
                workers.insert(id, worker);
            }
        }

        info!(workers = workers.len(), "scheduler reconciled");
    }

    fn spawn_worker(&self, endpoint: EndpointConfig) -> Worker {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let checker = Arc::clone(&self.checker);
        let store = Arc::clone(&self.store);
        let evaluator = Arc::clone(&self.evaluator);
        let worker_endpoint = endpoint.clone();
        let handle = tokio::spawn(run_worker(
            worker_endpoint,
            checker,
            store,
            evaluator,
            shutdown_rx,
        ));
        Worker {
            endpoint,
            shutdown: shutdown_tx,
            handle,
        }
    }
}

async fn stop_worker(worker: Worker) {
    let _ = worker.shutdown.send(true);
    if tokio::time::timeout(SHUTDOWN_GRACE, worker.handle)
        .await
        .is_err()
    {
        warn!(
            endpoint = %worker.endpoint.id,
            "worker did not stop within grace period, abandoning"
        );
    }
}

/// Worker loop: immediate probe at start, then one probe per interval.
/// Ticks are not compensated; a probe that overruns its interval delays
/// the next tick, so probes for one endpoint never overlap.
async fn run_worker(
    endpoint: EndpointConfig,
    checker: Arc<Checker>,
    store: Arc<dyn MetricStore>,
    evaluator: Arc<AlertEvaluator>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(endpoint.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(endpoint = %endpoint.id, "worker started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    _ = execute_check(&endpoint, &checker, &store, &evaluator) => {}
                    // Cancellation is observed mid-probe: dropping the
                    // probe future tears down its HTTP call.
                    _ = shutdown_rx.changed() => break,
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!(endpoint = %endpoint.id, "worker stopped");
}

async fn execute_check(
    endpoint: &EndpointConfig,
    checker: &Checker,
    store: &Arc<dyn MetricStore>,
    evaluator: &Arc<AlertEvaluator>,
) {
    let result = checker.check(endpoint, endpoint.timeout).await;

    if result.success {
        debug!(
            endpoint = %endpoint.id,
            status = result.status_code,
            duration = ?result.duration,
            "check passed"
        );
    } else {
        info!(endpoint = %endpoint.id, error = %result.error, "check failed");
    }

    if let Err(e) = store.write_result(&result).await {
        warn!(endpoint = %endpoint.id, "failed to write result: {e}");
    }

    evaluator.evaluate(endpoint, &result);
}
