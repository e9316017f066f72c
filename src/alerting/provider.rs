//! Notification provider abstraction.

use async_trait::async_trait;

use crate::config::{AlertChannel, AlertRule, EndpointConfig};
use crate::probe::ProbeResult;

/// Errors produced by notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to render alert template: {0}")]
    Template(String),

    #[error("failed to send alert: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("alert endpoint returned status {0}")]
    Status(u16),

    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),
}

/// A delivery mechanism for one channel type (`webhook`, later email,
/// chat, ...). Implementations are registered with the evaluator by
/// type name.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send(
        &self,
        channel: &AlertChannel,
        rule: &AlertRule,
        endpoint: &EndpointConfig,
        result: &ProbeResult,
    ) -> Result<(), SendError>;
}
