//! Configuration data model.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default probe interval applied when neither the endpoint nor the
/// global section specifies one.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-check timeout applied when neither the endpoint nor the
/// global section specifies one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Assignment wildcard: an endpoint listing this runs on every satellite.
pub const ASSIGNMENT_ALL: &str = "all";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_channels: Vec<AlertChannel>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_rules: Vec<AlertRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub satellites: Vec<SatelliteConfig>,
}

/// Global defaults inherited by endpoints that leave the matching field
/// unset (zero).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(with = "humantime_serde", default)]
    pub check_interval: Duration,

    #[serde(with = "humantime_serde", default)]
    pub request_timeout: Duration,
}

/// A monitored HTTP endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Stable identifier; generated at create time when absent.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// Probe interval; zero falls back to `global.check_interval`.
    #[serde(with = "humantime_serde", default)]
    pub interval: Duration,

    /// Per-check timeout; zero falls back to `global.request_timeout`.
    #[serde(with = "humantime_serde", default)]
    pub timeout: Duration,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "ValidationConfig::is_empty")]
    pub validation: ValidationConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    /// Satellite ids this endpoint is assigned to, or the literal `all`.
    /// Empty means the endpoint runs on the master.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub satellites: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Response validation rules for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Accepted status codes; empty means the 200-299 range.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_codes: Vec<u16>,

    #[serde(default, skip_serializing_if = "ContentMatch::is_empty")]
    pub content_match: ContentMatch,
}

impl ValidationConfig {
    pub fn is_empty(&self) -> bool {
        self.status_codes.is_empty() && self.content_match.is_empty()
    }
}

/// Body content check: a regular expression when `type` is `regex`,
/// otherwise a plain substring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMatch {
    #[serde(rename = "type", default)]
    pub match_type: String,

    #[serde(default)]
    pub pattern: String,
}

impl ContentMatch {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn is_regex(&self) -> bool {
        self.match_type == "regex"
    }
}

/// A notification channel referenced by alert rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertChannel {
    pub name: String,

    /// Provider type, looked up in the provider registry (`webhook`).
    #[serde(rename = "type")]
    pub channel_type: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Body template; rendered with `endpoint`, `rule` and `result` in
    /// scope.
    #[serde(default)]
    pub body: String,
}

/// A stateful alert rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,

    /// Condition expression, e.g. `success == false` or `duration > 5s`.
    pub condition: String,

    #[serde(default)]
    pub severity: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,

    /// Tag selector; every pair must match the endpoint's tags. Empty
    /// matches every endpoint.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl AlertRule {
    /// Whether this rule applies to an endpoint with the given tags.
    pub fn matches_tags(&self, endpoint_tags: &BTreeMap<String, String>) -> bool {
        self.tags
            .iter()
            .all(|(k, v)| endpoint_tags.get(k) == Some(v))
    }
}

/// A registered satellite probe node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatelliteConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl EndpointConfig {
    /// Whether the master scheduler runs this endpoint. Endpoints with a
    /// non-empty assignment are probed exclusively by satellites.
    pub fn is_master_local(&self) -> bool {
        self.satellites.is_empty()
    }

    /// Whether this endpoint is served to the given satellite.
    pub fn assigned_to(&self, satellite_id: &str) -> bool {
        self.satellites
            .iter()
            .any(|s| s == satellite_id || s == ASSIGNMENT_ALL)
    }

    pub fn effective_interval(&self, global: &GlobalConfig) -> Duration {
        if !self.interval.is_zero() {
            self.interval
        } else if !global.check_interval.is_zero() {
            global.check_interval
        } else {
            DEFAULT_CHECK_INTERVAL
        }
    }

    pub fn effective_timeout(&self, global: &GlobalConfig) -> Duration {
        if !self.timeout.is_zero() {
            self.timeout
        } else if !global.request_timeout.is_zero() {
            global.request_timeout
        } else {
            DEFAULT_REQUEST_TIMEOUT
        }
    }

    /// Copy of this endpoint with interval and timeout resolved against
    /// the global defaults. The scheduler diffs resolved endpoints so a
    /// change of a global default re-intervals dependent workers.
    pub fn resolved(&self, global: &GlobalConfig) -> EndpointConfig {
        let mut resolved = self.clone();
        resolved.interval = self.effective_interval(global);
        resolved.timeout = self.effective_timeout(global);
        resolved
    }
}

impl Config {
    /// Fill zero-valued global durations with the built-in defaults and
    /// give id-less endpoints a stable identity (their name, falling
    /// back to the url) so reloads do not churn workers.
    pub fn apply_defaults(&mut self) {
        if self.global.check_interval.is_zero() {
            self.global.check_interval = DEFAULT_CHECK_INTERVAL;
        }
        if self.global.request_timeout.is_zero() {
            self.global.request_timeout = DEFAULT_REQUEST_TIMEOUT;
        }
        for endpoint in &mut self.endpoints {
            if endpoint.id.is_empty() {
                endpoint.id = if !endpoint.name.is_empty() {
                    endpoint.name.clone()
                } else {
                    endpoint.url.clone()
                };
            }
        }
    }

    /// Semantic checks that make a snapshot unusable. Unresolved
    /// cross-references are deliberately *not* errors; see
    /// [`Config::warn_unresolved`].
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.url.is_empty() {
                return Err(format!("endpoint '{}' has no url", endpoint.name));
            }
            if !endpoint.id.is_empty() && !seen.insert(endpoint.id.as_str()) {
                return Err(format!("duplicate endpoint id '{}'", endpoint.id));
            }
        }

        let mut channels = std::collections::HashSet::new();
        for channel in &self.alert_channels {
            if channel.name.is_empty() {
                return Err("alert channel with empty name".to_string());
            }
            if !channels.insert(channel.name.as_str()) {
                return Err(format!("duplicate alert channel '{}'", channel.name));
            }
        }

        Ok(())
    }

    /// Log a warning for every reference that does not resolve within
    /// this snapshot: endpoint assignments naming unknown satellites and
    /// rules naming unknown channels.
    pub fn warn_unresolved(&self) {
        for endpoint in &self.endpoints {
            for sat in &endpoint.satellites {
                if sat != ASSIGNMENT_ALL && !self.satellites.iter().any(|s| &s.id == sat) {
                    warn!(
                        endpoint = %endpoint.id,
                        satellite = %sat,
                        "endpoint assigned to unknown satellite"
                    );
                }
            }
        }
        for rule in &self.alert_rules {
            for channel in &rule.channels {
                if !self.alert_channels.iter().any(|c| &c.name == channel) {
                    warn!(rule = %rule.name, channel = %channel, "rule notifies unknown channel");
                }
            }
        }
    }

    pub fn endpoint(&self, id: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn channel(&self, name: &str) -> Option<&AlertChannel> {
        self.alert_channels.iter().find(|c| c.name == name)
    }
}

/// Random 8-byte hex identifier for endpoints created without one.
pub fn generate_endpoint_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
