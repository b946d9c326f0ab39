//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics: bus, saga, payout and gate metrics in text exposition format.
pub async fn get(State(handle): State<PrometheusHandle>) -> Response {
    ([(CONTENT_TYPE, PROMETHEUS_TEXT)], handle.render()).into_response()
}
