//! SQLite-backed metric store.
//!
//! A single-file embedded database configured for concurrent readers
//! during writes (WAL journal) with a modest connection pool. Suitable
//! for deployments up to a few hundred endpoints; swap in a server-grade
//! backend behind [`MetricStore`] beyond that.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{info, instrument};

use crate::probe::ProbeResult;

use super::{MetricStore, StorageError};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `db_path` and prepare
    /// the schema.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = db_path.as_ref().to_string_lossy().to_string();
        info!("opening sqlite store at {path}");

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|source| StorageError::Open { path, source })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS http_checks (
                time            TEXT NOT NULL,
                endpoint_id     TEXT NOT NULL,
                satellite_id    TEXT NOT NULL DEFAULT '',
                url             TEXT NOT NULL,
                method          TEXT NOT NULL,
                status_code     INTEGER NOT NULL,
                success         INTEGER NOT NULL,
                duration_ns     INTEGER NOT NULL,
                dns_ns          INTEGER NOT NULL,
                conn_ns         INTEGER NOT NULL,
                tls_ns          INTEGER NOT NULL,
                ttfb_ns         INTEGER NOT NULL,
                bytes_received  INTEGER NOT NULL,
                error           TEXT NOT NULL,
                cert_expiry     TEXT,
                cert_issuer     TEXT NOT NULL DEFAULT '',
                cert_subject    TEXT NOT NULL DEFAULT '',
                cert_not_before TEXT,
                cert_not_after  TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Schema)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_http_checks_endpoint_time \
             ON http_checks (endpoint_id, time)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Schema)?;

        Ok(())
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn write_result(&self, result: &ProbeResult) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO http_checks (
                time, endpoint_id, satellite_id, url, method, status_code, success,
                duration_ns, dns_ns, conn_ns, tls_ns, ttfb_ns, bytes_received, error,
                cert_expiry, cert_issuer, cert_subject, cert_not_before, cert_not_after
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.timestamp)
        .bind(&result.endpoint_id)
        .bind(&result.satellite_id)
        .bind(&result.url)
        .bind(&result.method)
        .bind(result.status_code as i64)
        .bind(result.success)
        .bind(result.duration.as_nanos() as i64)
        .bind(result.dns_duration.as_nanos() as i64)
        .bind(result.connect_duration.as_nanos() as i64)
        .bind(result.tls_duration.as_nanos() as i64)
        .bind(result.ttfb.as_nanos() as i64)
        .bind(result.bytes_received as i64)
        .bind(&result.error)
        .bind(result.cert_expiry)
        .bind(&result.cert_issuer)
        .bind(&result.cert_subject)
        .bind(result.cert_not_before)
        .bind(result.cert_not_after)
        .execute(&self.pool)
        .await
        .map_err(|source| StorageError::Append {
            endpoint_id: result.endpoint_id.clone(),
            source,
        })?;
        Ok(())
    }

    async fn query_history(
        &self,
        endpoint_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, StorageError> {
        let history_error = |source| StorageError::History {
            endpoint_id: endpoint_id.to_string(),
            source,
        };

        let rows = sqlx::query(
            r#"
            SELECT time, endpoint_id, satellite_id, url, method, status_code, success,
                   duration_ns, dns_ns, conn_ns, tls_ns, ttfb_ns, bytes_received, error,
                   cert_expiry, cert_issuer, cert_subject, cert_not_before, cert_not_after
            FROM http_checks
            WHERE endpoint_id = ? AND time >= ? AND time <= ?
            ORDER BY time ASC
            "#,
        )
        .bind(endpoint_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(history_error)?;

        rows.iter()
            .map(|row| decode_row(row).map_err(history_error))
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &SqliteRow) -> Result<ProbeResult, sqlx::Error> {
    Ok(ProbeResult {
        timestamp: row.try_get("time")?,
        endpoint_id: row.try_get("endpoint_id")?,
        satellite_id: row.try_get("satellite_id")?,
        url: row.try_get("url")?,
        method: row.try_get("method")?,
        status_code: row.try_get::<i64, _>("status_code")? as u16,
        success: row.try_get("success")?,
        duration: ns_duration(row.try_get("duration_ns")?),
        dns_duration: ns_duration(row.try_get("dns_ns")?),
        connect_duration: ns_duration(row.try_get("conn_ns")?),
        tls_duration: ns_duration(row.try_get("tls_ns")?),
        ttfb: ns_duration(row.try_get("ttfb_ns")?),
        bytes_received: row.try_get::<i64, _>("bytes_received")? as u64,
        error: row.try_get("error")?,
        cert_expiry: row.try_get("cert_expiry")?,
        cert_issuer: row.try_get("cert_issuer")?,
        cert_subject: row.try_get("cert_subject")?,
        cert_not_before: row.try_get("cert_not_before")?,
        cert_not_after: row.try_get("cert_not_after")?,
    })
}

fn ns_duration(ns: i64) -> Duration {
    Duration::from_nanos(ns.max(0) as u64)
}
