//! Configuration management endpoints.
//!
//! Every mutation goes through [`crate::config::ConfigManager::update`],
//! so the file on disk, the published snapshot and all subscribers stay
//! consistent. Validation failures surface as 400 with a stable message.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::config::{generate_endpoint_id, Config, ConfigError, EndpointConfig};

/// GET /api/v1/config
pub async fn get_config(State(state): State<ApiState>) -> Json<Config> {
    Json(Config::clone(&state.config.snapshot()))
}

/// POST /api/v1/config — replace the whole document.
pub async fn replace_config(
    State(state): State<ApiState>,
    Json(new_config): Json<Config>,
) -> Result<Json<Config>, ApiError> {
    let accepted = state.config.update(move |config| {
        *config = new_config;
        Ok(())
    })?;
    Ok(Json(Config::clone(&accepted)))
}

/// POST /api/v1/config/endpoints — create one endpoint.
pub async fn create_endpoint(
    State(state): State<ApiState>,
    Json(mut endpoint): Json<EndpointConfig>,
) -> Result<(StatusCode, Json<EndpointConfig>), ApiError> {
    if endpoint.name.is_empty() || endpoint.url.is_empty() {
        return Err(ApiError::BadRequest("name and url are required".to_string()));
    }
    if endpoint.id.is_empty() {
        endpoint.id = generate_endpoint_id();
    }

    let created = endpoint.clone();
    state.config.update(move |config| {
        if config.endpoints.iter().any(|e| e.id == endpoint.id) {
            return Err(ConfigError::Invalid(format!(
                "endpoint with id '{}' already exists",
                endpoint.id
            )));
        }
        config.endpoints.push(endpoint);
        Ok(())
    })?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/v1/config/endpoints/{id} — replace one endpoint. The id in
/// the path wins over whatever the body carries.
pub async fn update_endpoint(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(mut endpoint): Json<EndpointConfig>,
) -> Result<Json<EndpointConfig>, ApiError> {
    if state.config.snapshot().endpoint(&id).is_none() {
        return Err(ApiError::EndpointNotFound(id));
    }

    endpoint.id = id.clone();
    let updated = endpoint.clone();
    state.config.update(move |config| {
        match config.endpoints.iter_mut().find(|e| e.id == id) {
            Some(existing) => {
                *existing = endpoint;
                Ok(())
            }
            None => Err(ConfigError::Invalid(format!(
                "endpoint '{id}' vanished during update"
            ))),
        }
    })?;

    Ok(Json(updated))
}

/// DELETE /api/v1/config/endpoints/{id}
pub async fn delete_endpoint(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.config.snapshot().endpoint(&id).is_none() {
        return Err(ApiError::EndpointNotFound(id));
    }

    state.config.update(move |config| {
        config.endpoints.retain(|e| e.id != id);
        Ok(())
    })?;

    Ok(StatusCode::NO_CONTENT)
}
