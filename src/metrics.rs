//! Prometheus metrics for the reconcile controller.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP
//! request counts, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Completed JSON-RPC calls (counter). Labels: method, outcome.
pub const RPC_CALLS_TOTAL: &str = "reconcile_rpc_calls_total";

/// Completed failover handoffs (counter).
pub const FAILOVERS_TOTAL: &str = "reconcile_failovers_total";

/// Heartbeat ticks (counter). Labels: result.
pub const HEARTBEAT_TICKS_TOTAL: &str = "reconcile_heartbeat_ticks_total";

/// Index of the current primary in the cluster list (gauge).
pub const PRIMARY_INDEX: &str = "reconcile_primary_index";

/// HTTP requests served by the health endpoint (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "reconcile_http_requests_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder.  Idempotent.
///
/// Fails if another recorder was installed first.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(RPC_CALLS_TOTAL, "Completed JSON-RPC calls by method and outcome");
    describe_counter!(FAILOVERS_TOTAL, "Completed failover handoffs");
    describe_counter!(HEARTBEAT_TICKS_TOTAL, "Heartbeat ticks by result");
    describe_gauge!(PRIMARY_INDEX, "Cluster index of the current primary sequencer");
    describe_counter!(HTTP_REQUESTS_TOTAL, "HTTP requests served by the health endpoint");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware counting every request except scrapes of `/metrics`.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method, "path" => path, "status" => status)
        .increment(1);

    response
}

/// Collapse unknown paths into one label value to bound cardinality.
fn normalize_path(path: &str) -> String {
    match path {
        "/healthz" | "/readyz" | "/metrics" => path.to_string(),
        _ => "/other".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
