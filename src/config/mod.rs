//! Declarative configuration: data model and hot-reloadable manager.
//!
//! The configuration file is a single YAML document with top-level keys
//! `global`, `endpoints`, `alert_channels`, `alert_rules` and
//! `satellites`. Duration fields accept humantime strings (`500ms`,
//! `10s`, `1m`). Unknown keys are ignored.
//!
//! Snapshots are immutable once published: consumers always receive a
//! whole [`std::sync::Arc<Config>`], never a partial delta.

pub mod manager;
pub mod model;

pub use manager::{ConfigError, ConfigManager};
pub use model::{
    AlertChannel, AlertRule, Config, ContentMatch, EndpointConfig, GlobalConfig, SatelliteConfig,
    ValidationConfig, generate_endpoint_id,
};
