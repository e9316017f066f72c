//! In-memory metric store (no persistence).
//!
//! A per-endpoint ring buffer. Useful for tests and for running the
//! master without a database; data is lost on restart.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::probe::ProbeResult;

use super::{MetricStore, StorageError};

/// Results kept per endpoint before the oldest are evicted.
const DEFAULT_CAPACITY: usize = 10_000;

pub struct MemoryStore {
    results: RwLock<HashMap<String, VecDeque<ProbeResult>>>,
    capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Total results across all endpoints.
    pub async fn len(&self) -> usize {
        self.results.read().await.values().map(VecDeque::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn write_result(&self, result: &ProbeResult) -> Result<(), StorageError> {
        let mut results = self.results.write().await;
        let bucket = results.entry(result.endpoint_id.clone()).or_default();
        if bucket.len() >= self.capacity {
            bucket.pop_front();
        }
        bucket.push_back(result.clone());
        Ok(())
    }

    async fn query_history(
        &self,
        endpoint_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, StorageError> {
        let results = self.results.read().await;
        Ok(results
            .get(endpoint_id)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|r| r.timestamp >= from && r.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn close(&self) {}
}
