//! Single-check execution: dial, request, follow redirects, validate.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::header::{HOST, LOCATION};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use regex::Regex;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use url::Url;

use crate::config::EndpointConfig;

use super::conn::{CertInfo, ConnKey, ConnPool, PooledConn};
use super::result::ProbeResult;

/// Redirects followed before the last response is returned as-is.
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub(super) enum CheckError {
    #[error("dns lookup failed: {0}")]
    Dns(std::io::Error),

    #[error("connect failed: {0}")]
    Connect(std::io::Error),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("status code validation failed")]
    StatusValidation,

    #[error("invalid regex: {0}")]
    InvalidRegex(regex::Error),

    #[error("content regex match failed")]
    RegexMismatch,

    #[error("content string match failed")]
    StringMismatch,

    #[error("failed to read body: {0}")]
    BodyRead(String),

    #[error("{0}")]
    Request(String),
}

/// HTTP probe engine. One instance (and therefore one connection pool)
/// per process; cheap to share behind an `Arc`.
pub struct Checker {
    pool: ConnPool,
    tls: TlsConnector,
}

impl Checker {
    pub fn new() -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config =
            rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .expect("ring provider supports the default protocol versions")
                .with_root_certificates(roots)
                .with_no_client_auth();
        Self {
            pool: ConnPool::default(),
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Execute one probe under `timeout`. Never fails: every outcome is
    /// encoded in the returned result, with `success == true` exactly
    /// when `error` is empty.
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint.id, url = %endpoint.url))]
    pub async fn check(&self, endpoint: &EndpointConfig, timeout: Duration) -> ProbeResult {
        let mut result = ProbeResult::new(endpoint);
        let start = Instant::now();

        match tokio::time::timeout(timeout, self.execute(endpoint, start, &mut result)).await {
            Ok(Ok(())) => result.success = true,
            Ok(Err(e)) => result.error = e.to_string(),
            Err(_) => result.error = "timeout".to_string(),
        }
        if !result.success && result.duration.is_zero() {
            result.duration = start.elapsed();
        }
        result
    }

    async fn execute(
        &self,
        endpoint: &EndpointConfig,
        start: Instant,
        result: &mut ProbeResult,
    ) -> Result<(), CheckError> {
        let mut target =
            Url::parse(&endpoint.url).map_err(|e| CheckError::Request(e.to_string()))?;
        let mut method = parse_method(&endpoint.method)?;

        let mut redirects = 0;
        let (conn, response) = loop {
            let (conn, response) = self
                .request(&target, &method, &endpoint.headers, result)
                .await?;
            result.ttfb = start.elapsed();

            if redirects < MAX_REDIRECTS {
                if let Some(location) = redirect_location(&response) {
                    redirects += 1;
                    debug!(%location, "following redirect");
                    method = redirect_method(&method, response.status());
                    target = target
                        .join(&location)
                        .map_err(|e| CheckError::Request(e.to_string()))?;
                    // Redirect bodies are not read; the hop connection is
                    // dropped rather than pooled mid-response.
                    continue;
                }
            }
            break (conn, response);
        };

        // Header receipt: everything past this point is body handling and
        // must not inflate duration or TTFB.
        result.duration = start.elapsed();
        result.status_code = response.status().as_u16();

        if let Some(cert) = &conn.cert {
            result.cert_issuer = cert.issuer.clone();
            result.cert_subject = cert.subject.clone();
            result.cert_not_before = cert.not_before;
            result.cert_not_after = cert.not_after;
            result.cert_expiry = cert.not_after;
        }

        if !status_allowed(&endpoint.validation.status_codes, result.status_code) {
            return Err(CheckError::StatusValidation);
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| CheckError::BodyRead(e.to_string()))?
            .to_bytes();
        result.bytes_received = body.len() as u64;

        // Fully consumed response: the connection is reusable.
        self.pool.checkin(conn);

        let content = &endpoint.validation.content_match;
        if !content.pattern.is_empty() {
            let text = String::from_utf8_lossy(&body);
            if content.is_regex() {
                let re = Regex::new(&content.pattern).map_err(CheckError::InvalidRegex)?;
                if !re.is_match(&text) {
                    return Err(CheckError::RegexMismatch);
                }
            } else if !text.contains(&content.pattern) {
                return Err(CheckError::StringMismatch);
            }
        }

        Ok(())
    }

    /// Issue one request, preferring a pooled connection. A stale pooled
    /// connection falls back to a fresh dial, whose phase timings are
    /// recorded into `result`.
    async fn request(
        &self,
        target: &Url,
        method: &Method,
        headers: &BTreeMap<String, String>,
        result: &mut ProbeResult,
    ) -> Result<(PooledConn, Response<Incoming>), CheckError> {
        let key = ConnKey::from_url(target)?;

        if let Some(mut conn) = self.pool.checkout(&key) {
            match conn
                .sender
                .send_request(build_request(target, method, headers)?)
                .await
            {
                Ok(response) => return Ok((conn, response)),
                Err(e) => debug!("pooled connection failed, redialing: {e}"),
            }
        }

        let mut conn = self.dial(&key, result).await?;
        let response = conn
            .sender
            .send_request(build_request(target, method, headers)?)
            .await
            .map_err(|e| CheckError::Request(e.to_string()))?;
        Ok((conn, response))
    }

    /// Dial a new connection, timing DNS, TCP connect and TLS handshake.
    async fn dial(&self, key: &ConnKey, result: &mut ProbeResult) -> Result<PooledConn, CheckError> {
        let addrs: Vec<SocketAddr> = if let Ok(ip) = key.host.parse::<IpAddr>() {
            // IP literal: no DNS phase, reported as zero.
            vec![SocketAddr::new(ip, key.port)]
        } else {
            let dns_start = Instant::now();
            let addrs = tokio::net::lookup_host((key.host.as_str(), key.port))
                .await
                .map_err(CheckError::Dns)?
                .collect::<Vec<_>>();
            result.dns_duration = dns_start.elapsed();
            addrs
        };
        if addrs.is_empty() {
            return Err(CheckError::Dns(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses for {}", key.host),
            )));
        }

        let connect_start = Instant::now();
        let stream = TcpStream::connect(addrs.as_slice())
            .await
            .map_err(CheckError::Connect)?;
        result.connect_duration = connect_start.elapsed();
        let _ = stream.set_nodelay(true);

        if key.tls {
            let tls_start = Instant::now();
            let server_name = ServerName::try_from(key.host.clone())
                .map_err(|e| CheckError::Tls(e.to_string()))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| CheckError::Tls(e.to_string()))?;
            result.tls_duration = tls_start.elapsed();

            let cert =
                CertInfo::from_peer_certificates(tls_stream.get_ref().1.peer_certificates());

            let (sender, driver) = http1::handshake(TokioIo::new(tls_stream))
                .await
                .map_err(|e| CheckError::Request(e.to_string()))?;
            tokio::spawn(async move {
                let _ = driver.await;
            });
            Ok(PooledConn::new(key.clone(), sender, cert))
        } else {
            let (sender, driver) = http1::handshake(TokioIo::new(stream))
                .await
                .map_err(|e| CheckError::Request(e.to_string()))?;
            tokio::spawn(async move {
                let _ = driver.await;
            });
            Ok(PooledConn::new(key.clone(), sender, None))
        }
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_method(method: &str) -> Result<Method, CheckError> {
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(method.as_bytes())
        .map_err(|_| CheckError::Request(format!("invalid method '{method}'")))
}

fn build_request(
    target: &Url,
    method: &Method,
    headers: &BTreeMap<String, String>,
) -> Result<Request<Empty<Bytes>>, CheckError> {
    let mut builder = Request::builder()
        .method(method.clone())
        .uri(origin_form(target))
        .header(HOST, host_header(target));
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Empty::new())
        .map_err(|e| CheckError::Request(e.to_string()))
}

/// Origin-form request target for an HTTP/1.1 connection.
fn origin_form(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn status_allowed(allowed: &[u16], status: u16) -> bool {
    if allowed.is_empty() {
        (200..300).contains(&status)
    } else {
        allowed.contains(&status)
    }
}

fn redirect_location(response: &Response<Incoming>) -> Option<String> {
    if !matches!(response.status().as_u16(), 301 | 302 | 303 | 307 | 308) {
        return None;
    }
    response
        .headers()
        .get(LOCATION)?
        .to_str()
        .ok()
        .map(str::to_string)
}

/// Method rewriting across a redirect hop: 303 always degrades to GET
/// (except HEAD), 301/302 degrade non-idempotent methods, 307/308
/// preserve the method.
fn redirect_method(method: &Method, status: StatusCode) -> Method {
    match status.as_u16() {
        303 => {
            if *method == Method::HEAD {
                Method::HEAD
            } else {
                Method::GET
            }
        }
        301 | 302 => {
            if *method == Method::GET || *method == Method::HEAD {
                method.clone()
            } else {
                Method::GET
            }
        }
        _ => method.clone(),
    }
}
