//! Result persistence.
//!
//! Probe results are an append-only time series keyed by
//! `(endpoint_id, time)`. The [`MetricStore`] trait abstracts the
//! backend: SQLite for a single-file deployment, an in-memory ring
//! buffer for tests. Store failures are logged by callers and never
//! abort the scheduler.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::probe::ProbeResult;

/// Failure modes of the result time series. Each variant carries the
/// context a log line needs to be actionable: the database path for
/// startup failures, the endpoint id for per-result ones. The in-memory
/// backend never produces any of these.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open metric store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to prepare the http_checks schema: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("failed to append result for endpoint '{endpoint_id}': {source}")]
    Append {
        endpoint_id: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read history for endpoint '{endpoint_id}': {source}")]
    History {
        endpoint_id: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Persistent sink and query surface for probe results.
///
/// Implementations must be `Send + Sync`; they are shared across worker
/// tasks behind an `Arc`.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Append one result. Writes for the same endpoint are issued in
    /// probe-completion order by the single per-endpoint worker.
    async fn write_result(&self, result: &ProbeResult) -> Result<(), StorageError>;

    /// Results for an endpoint within `[from, to]`, time ascending.
    async fn query_history(
        &self,
        endpoint_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, StorageError>;

    /// Release backend resources.
    async fn close(&self);
}
