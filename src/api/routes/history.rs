//! Result history queries.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::probe::ProbeResult;

/// Lookback window used when neither an explicit range nor a duration
/// is given.
const DEFAULT_LOOKBACK: &str = "1h";

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    /// Humantime lookback (e.g. `30m`), used when `from`/`to` are
    /// absent.
    duration: Option<String>,
}

/// GET /api/v1/endpoints/{id}/history
///
/// Rows for one endpoint in the requested window, time ascending.
pub async fn endpoint_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ProbeResult>>, ApiError> {
    let (from, to) = match (query.from, query.to) {
        (Some(from), Some(to)) => (from, to),
        _ => {
            let lookback = query.duration.as_deref().unwrap_or(DEFAULT_LOOKBACK);
            let lookback = humantime::parse_duration(lookback)
                .map_err(|e| ApiError::BadRequest(format!("invalid duration: {e}")))?;
            let lookback = chrono::Duration::from_std(lookback)
                .map_err(|e| ApiError::BadRequest(format!("invalid duration: {e}")))?;
            let now = Utc::now();
            (now - lookback, now)
        }
    };

    let results = state.store.query_history(&id, from, to).await?;
    Ok(Json(results))
}
