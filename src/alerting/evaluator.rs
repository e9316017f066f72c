//! Per-rule alert state machine and notification dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{AlertRule, Config, ConfigManager, EndpointConfig};
use crate::probe::ProbeResult;

use super::condition::Condition;
use super::provider::Provider;

/// Upper bound for a single notification delivery.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Key of a firing alert: one state machine per (endpoint, rule).
type AlertKey = (String, String);

/// Evaluates every probe result against the rule set of the current
/// config snapshot and notifies on state *transitions* only.
pub struct AlertEvaluator {
    config: Arc<ConfigManager>,
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    /// Keys currently in FIRING state. The mutex is held only around
    /// membership flips, never across delivery I/O.
    active: Mutex<HashSet<AlertKey>>,
}

impl AlertEvaluator {
    pub fn new(config: Arc<ConfigManager>) -> Self {
        Self {
            config,
            providers: RwLock::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Register a delivery provider for a channel type (e.g. `webhook`).
    pub fn register_provider(&self, channel_type: &str, provider: Arc<dyn Provider>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_type.to_string(), provider);
    }

    /// Whether the (endpoint, rule) pair is currently firing.
    pub fn is_firing(&self, endpoint_id: &str, rule_name: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(endpoint_id.to_string(), rule_name.to_string()))
    }

    /// Evaluate one result. The state-machine path is synchronous and
    /// never awaits I/O; deliveries run on detached tasks under a
    /// bounded timeout.
    pub fn evaluate(&self, endpoint: &EndpointConfig, result: &ProbeResult) {
        let snapshot = self.config.snapshot();

        for rule in &snapshot.alert_rules {
            // Rules whose selector does not match are skipped entirely:
            // they can neither fire nor resolve for this endpoint.
            if !rule.matches_tags(&endpoint.tags) {
                continue;
            }

            let triggered = Condition::parse(&rule.condition).evaluate(result);
            let key = (endpoint.id.clone(), rule.name.clone());

            let newly_fired = {
                let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
                if triggered {
                    active.insert(key)
                } else {
                    if active.remove(&key) {
                        info!(
                            rule = %rule.name,
                            endpoint = %endpoint.name,
                            "alert resolved"
                        );
                    }
                    false
                }
            };

            if newly_fired {
                info!(rule = %rule.name, endpoint = %endpoint.name, "alert triggered");
                self.dispatch(rule, endpoint, result, &snapshot);
            }
        }
    }

    /// Fan a notification out to every channel the rule names. Missing
    /// channels and unregistered provider types are logged and skipped;
    /// they never block the other channels or undo the transition.
    fn dispatch(
        &self,
        rule: &AlertRule,
        endpoint: &EndpointConfig,
        result: &ProbeResult,
        snapshot: &Config,
    ) {
        for channel_name in &rule.channels {
            let Some(channel) = snapshot.channel(channel_name) else {
                warn!(channel = %channel_name, rule = %rule.name, "alert channel not found");
                continue;
            };

            let provider = {
                let providers = self
                    .providers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                providers.get(&channel.channel_type).cloned()
            };
            let Some(provider) = provider else {
                warn!(
                    channel_type = %channel.channel_type,
                    channel = %channel.name,
                    "no provider registered for channel type"
                );
                continue;
            };

            let channel = channel.clone();
            let rule = rule.clone();
            let endpoint = endpoint.clone();
            let result = result.clone();
            tokio::spawn(async move {
                let delivery = provider.send(&channel, &rule, &endpoint, &result);
                match tokio::time::timeout(DELIVERY_TIMEOUT, delivery).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(channel = %channel.name, rule = %rule.name, "alert delivery failed: {e}");
                    }
                    Err(_) => {
                        warn!(channel = %channel.name, rule = %rule.name, "alert delivery timed out");
                    }
                }
            });
        }
    }
}
