//! Satellite agent.
//!
//! A satellite holds no configuration of its own. It heartbeats the
//! master every 30 seconds and, on a 60 second cadence (2 second
//! initial delay, immediate first pass), pulls its endpoint assignment,
//! probes every endpoint sequentially with the same engine the master
//! uses, and pushes the batch of results back.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{EndpointConfig, GlobalConfig};
use crate::probe::{Checker, ProbeResult};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const EXECUTION_INTERVAL: Duration = Duration::from_secs(60);
const STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Identity header carried on every satellite → master call.
pub const SATELLITE_ID_HEADER: &str = "X-Satellite-ID";

pub struct SatelliteAgent {
    id: String,
    master_url: String,
    client: reqwest::Client,
    checker: Checker,
}

impl SatelliteAgent {
    pub fn new(id: impl Into<String>, master_url: impl Into<String>) -> Self {
        let mut master_url = master_url.into();
        while master_url.ends_with('/') {
            master_url.pop();
        }
        Self {
            id: id.into(),
            master_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            checker: Checker::new(),
        }
    }

    /// Run until the shutdown signal flips. Transport failures are
    /// logged and retried on the next tick; the agent never exits on
    /// its own.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(satellite = %self.id, master = %self.master_url, "satellite agent starting");

        tokio::select! {
            _ = tokio::time::sleep(STARTUP_DELAY) => {}
            _ = shutdown_rx.changed() => return,
        }

        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );
        let mut execution = tokio::time::interval(EXECUTION_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = heartbeat.tick() => self.send_heartbeat().await,
                _ = execution.tick() => self.run_checks().await,
            }
        }
        info!(satellite = %self.id, "satellite agent stopped");
    }

    async fn send_heartbeat(&self) {
        let url = format!("{}/api/v1/satellites/heartbeat", self.master_url);
        match self
            .client
            .post(&url)
            .header(SATELLITE_ID_HEADER, &self.id)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("heartbeat sent");
            }
            Ok(response) => {
                warn!(status = %response.status(), "heartbeat rejected by master");
            }
            Err(e) => warn!("failed to send heartbeat: {e}"),
        }
    }

    async fn run_checks(&self) {
        let endpoints = match self.fetch_assignment().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("failed to fetch assignment: {e}");
                return;
            }
        };
        if endpoints.is_empty() {
            debug!("assignment is empty, nothing to do");
            return;
        }

        info!(count = endpoints.len(), "running assigned checks");
        let defaults = GlobalConfig::default();
        let mut results = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let timeout = endpoint.effective_timeout(&defaults);
            let mut result = self.checker.check(endpoint, timeout).await;
            result.satellite_id = self.id.clone();
            results.push(result);
        }

        match self.push_results(&results).await {
            Ok(()) => info!(count = results.len(), "pushed results"),
            Err(e) => warn!("failed to push results: {e}"),
        }
    }

    async fn fetch_assignment(&self) -> Result<Vec<EndpointConfig>, reqwest::Error> {
        let url = format!("{}/api/v1/satellites/config", self.master_url);
        self.client
            .get(&url)
            .header(SATELLITE_ID_HEADER, &self.id)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<EndpointConfig>>()
            .await
    }

    async fn push_results(&self, results: &[ProbeResult]) -> Result<(), reqwest::Error> {
        let url = format!("{}/api/v1/satellites/results", self.master_url);
        self.client
            .post(&url)
            .header(SATELLITE_ID_HEADER, &self.id)
            .json(results)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
