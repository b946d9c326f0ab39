//! Readiness endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::AppState;
use crate::readiness::{NodeStatus, ServiceStatus};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: NodeStatus,
    pub services: BTreeMap<&'static str, ServiceStatus>,
    pub pending_events: usize,
}

/// GET /ready: gate outcome per downstream service.
///
/// Answers 503 while any gate is still polling. A timed out gate does not
/// make the node unready; it is reported as `degraded`.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let report = state.readiness.report();
    let code = match report.status {
        NodeStatus::Starting => StatusCode::SERVICE_UNAVAILABLE,
        NodeStatus::Ready | NodeStatus::Degraded => StatusCode::OK,
    };
    (
        code,
        Json(ReadyResponse {
            status: report.status,
            services: report.services,
            pending_events: state.services.pending_events(),
        }),
    )
}
