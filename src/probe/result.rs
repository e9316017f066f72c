//! Probe result record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;

/// Outcome of a single probe attempt.
///
/// Exactly one of `success == true` with an empty error, or
/// `success == false` with a non-empty error, holds. Timing
/// sub-durations are zero when the phase did not occur (reused
/// connection, plain HTTP). On the wire durations are nanosecond
/// integers and timestamps RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probe start time.
    pub timestamp: DateTime<Utc>,

    pub endpoint_id: String,

    /// Id of the satellite that produced this result; empty on the
    /// master.
    #[serde(default)]
    pub satellite_id: String,

    pub url: String,
    pub method: String,

    /// Final response status; zero when no response was received.
    #[serde(default)]
    pub status_code: u16,

    /// Wall time from request dispatch to response-header receipt (or
    /// error). Body read time is excluded.
    #[serde(with = "duration_ns", default)]
    pub duration: Duration,

    #[serde(with = "duration_ns", default)]
    pub dns_duration: Duration,

    #[serde(with = "duration_ns", default)]
    pub connect_duration: Duration,

    #[serde(with = "duration_ns", default)]
    pub tls_duration: Duration,

    /// Time to first response byte, measured from request dispatch.
    #[serde(with = "duration_ns", default)]
    pub ttfb: Duration,

    #[serde(default)]
    pub bytes_received: u64,

    pub success: bool,

    #[serde(default)]
    pub error: String,

    /// Leaf certificate metadata; absent for plain HTTP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_expiry: Option<DateTime<Utc>>,

    #[serde(default)]
    pub cert_issuer: String,

    #[serde(default)]
    pub cert_subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_not_before: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_not_after: Option<DateTime<Utc>>,
}

impl ProbeResult {
    /// Fresh result for an attempt starting now.
    pub fn new(endpoint: &EndpointConfig) -> Self {
        Self {
            timestamp: Utc::now(),
            endpoint_id: endpoint.id.clone(),
            satellite_id: String::new(),
            url: endpoint.url.clone(),
            method: if endpoint.method.is_empty() {
                "GET".to_string()
            } else {
                endpoint.method.clone()
            },
            status_code: 0,
            duration: Duration::ZERO,
            dns_duration: Duration::ZERO,
            connect_duration: Duration::ZERO,
            tls_duration: Duration::ZERO,
            ttfb: Duration::ZERO,
            bytes_received: 0,
            success: false,
            error: String::new(),
            cert_expiry: None,
            cert_issuer: String::new(),
            cert_subject: String::new(),
            cert_not_before: None,
            cert_not_after: None,
        }
    }
}

/// Durations serialised as nanosecond integers.
pub(crate) mod duration_ns {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ns = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_nanoseconds() {
        let endpoint = EndpointConfig {
            id: "e1".to_string(),
            url: "http://example.com".to_string(),
            ..Default::default()
        };
        let mut result = ProbeResult::new(&endpoint);
        result.duration = Duration::from_millis(250);
        result.success = true;

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 250_000_000u64);
        assert_eq!(json["endpoint_id"], "e1");
        assert!(json["timestamp"].is_string());
        assert!(json.get("cert_not_after").is_none());

        let back: ProbeResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(250));
    }
}
