//! A single process running the marketplace services on the in-memory bus.
//!
//! Besides the services themselves the node owns the operational pieces:
//! configuration, consumer workers, the bootstrap gates, the payout
//! scheduler, the outbox relay, and the `/health`, `/ready` and `/metrics`
//! endpoints.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod readiness;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use common::Clock;
use event_bus::InMemoryEventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::Choreography;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use readiness::ReadinessBoard;

/// Shared state of the operational endpoints.
pub struct AppState {
    pub services: Arc<Choreography>,
    pub readiness: Arc<ReadinessBoard>,
}

/// Creates the Axum router for the operational endpoints.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/ready", get(routes::ready::check))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Starts the services on `bus` and creates the system accounts.
///
/// The accounts' `MemberJoined` events are only published here; replicas
/// appear once the bus delivers them.
pub async fn start_services(
    config: &Config,
    bus: &InMemoryEventBus,
    clock: Arc<dyn Clock>,
) -> saga::Result<Arc<Choreography>> {
    let services =
        Choreography::start(Arc::new(bus.clone()), clock, config.payout_policy()).await?;
    services.member.ensure_system_accounts().await?;
    Ok(Arc::new(services))
}
