//! Satellite-facing endpoints: heartbeat, assignment, result ingestion.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::agent::SATELLITE_ID_HEADER;
use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::config::EndpointConfig;
use crate::fleet::SatelliteState;
use crate::probe::ProbeResult;

/// Pull the caller's satellite id out of the identity header and check
/// it against the fleet.
fn authenticated_satellite(state: &ApiState, headers: &HeaderMap) -> Result<String, ApiError> {
    let id = headers
        .get(SATELLITE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingSatelliteId)?;
    if !state.fleet.is_known(id) {
        return Err(ApiError::UnknownSatellite(id.to_string()));
    }
    Ok(id.to_string())
}

/// POST /api/v1/satellites/heartbeat
pub async fn heartbeat(State(state): State<ApiState>, headers: HeaderMap) -> Result<(), ApiError> {
    let id = authenticated_satellite(&state, &headers)?;
    state.fleet.record_heartbeat(&id);
    Ok(())
}

/// GET /api/v1/satellites/config
///
/// The caller's endpoint assignment: every endpoint whose `satellites`
/// list names it or the wildcard `all`.
pub async fn assignment(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<EndpointConfig>>, ApiError> {
    let id = authenticated_satellite(&state, &headers)?;
    Ok(Json(state.fleet.assignment_for(&id)))
}

/// POST /api/v1/satellites/results
///
/// Accepts a JSON batch of probe results. The batch is accepted as soon
/// as it parses; individual write failures are logged server-side and
/// do not fail the call.
pub async fn push_results(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(results): Json<Vec<ProbeResult>>,
) -> Result<Json<Value>, ApiError> {
    let id = authenticated_satellite(&state, &headers)?;
    let stored = state.fleet.ingest(&id, results).await;
    Ok(Json(json!({ "stored": stored })))
}

/// GET /api/v1/satellites
pub async fn list(State(state): State<ApiState>) -> Json<Vec<SatelliteState>> {
    Json(state.fleet.states())
}
