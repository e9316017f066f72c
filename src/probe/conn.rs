//! Connection dialing and the per-process idle pool.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Empty;
use hyper::client::conn::http1::SendRequest;
use rustls::pki_types::CertificateDer;
use tracing::warn;
use url::Url;

use super::checker::CheckError;

/// Idle connections kept per (scheme, host, port).
const MAX_IDLE_PER_HOST: usize = 10;

/// Idle connections older than this are discarded at checkout.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Pool key: one bucket per origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct ConnKey {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl ConnKey {
    pub fn from_url(url: &Url) -> Result<Self, CheckError> {
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(CheckError::Request(format!("unsupported scheme '{other}'")));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| CheckError::Request("url has no host".to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CheckError::Request("url has no port".to_string()))?;
        Ok(Self { host, port, tls })
    }
}

/// Leaf certificate metadata captured at TLS handshake time.
#[derive(Debug, Clone, Default)]
pub(super) struct CertInfo {
    pub issuer: String,
    pub subject: String,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
}

impl CertInfo {
    pub fn from_peer_certificates(certs: Option<&[CertificateDer<'_>]>) -> Option<Self> {
        let leaf = certs?.first()?;
        match x509_parser::parse_x509_certificate(leaf.as_ref()) {
            Ok((_, cert)) => Some(Self {
                issuer: cert.issuer().to_string(),
                subject: cert.subject().to_string(),
                not_before: DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0),
                not_after: DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0),
            }),
            Err(e) => {
                warn!("failed to parse peer certificate: {e}");
                None
            }
        }
    }
}

/// An established HTTP/1.1 connection. The driving task runs in the
/// background; dropping the sender closes it.
pub(super) struct PooledConn {
    pub key: ConnKey,
    pub sender: SendRequest<Empty<Bytes>>,
    pub cert: Option<CertInfo>,
    idle_since: Instant,
}

impl PooledConn {
    pub fn new(key: ConnKey, sender: SendRequest<Empty<Bytes>>, cert: Option<CertInfo>) -> Self {
        Self {
            key,
            sender,
            cert,
            idle_since: Instant::now(),
        }
    }
}

/// Bounded idle-connection pool, one per [`super::Checker`].
#[derive(Default)]
pub(super) struct ConnPool {
    idle: Mutex<HashMap<ConnKey, Vec<PooledConn>>>,
}

impl ConnPool {
    pub fn checkout(&self, key: &ConnKey) -> Option<PooledConn> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = idle.get_mut(key)?;
        while let Some(conn) = bucket.pop() {
            if conn.idle_since.elapsed() < IDLE_TIMEOUT && !conn.sender.is_closed() {
                return Some(conn);
            }
            // Stale or half-closed; dropping it tears the connection down.
        }
        None
    }

    pub fn checkin(&self, mut conn: PooledConn) {
        if conn.sender.is_closed() {
            return;
        }
        conn.idle_since = Instant::now();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = idle.entry(conn.key.clone()).or_default();
        if bucket.len() < MAX_IDLE_PER_HOST {
            bucket.push(conn);
        }
    }
}
