//! Master HTTP surface.
//!
//! Two route groups share one router and one [`ApiState`]:
//!
//! - the satellite surface (`/api/v1/satellites/*`): heartbeat,
//!   per-satellite assignment, batched result ingestion;
//! - the management surface: config read/replace, endpoint CRUD and
//!   result history.
//!
//! Authentication, the web UI and health/metrics exposition live
//! outside this crate.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::ApiState;

use std::net::SocketAddr;

use axum::routing::{get, post, put};
use axum::Router;
use tracing::info;

/// Build the full API router over the given state.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/satellites/heartbeat", post(routes::satellites::heartbeat))
        .route("/api/v1/satellites/config", get(routes::satellites::assignment))
        .route("/api/v1/satellites/results", post(routes::satellites::push_results))
        .route("/api/v1/satellites", get(routes::satellites::list))
        .route(
            "/api/v1/config",
            get(routes::config::get_config).post(routes::config::replace_config),
        )
        .route("/api/v1/config/endpoints", post(routes::config::create_endpoint))
        .route(
            "/api/v1/config/endpoints/{id}",
            put(routes::config::update_endpoint).delete(routes::config::delete_endpoint),
        )
        .route("/api/v1/endpoints/{id}/history", get(routes::history::endpoint_history))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
