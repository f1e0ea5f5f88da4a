//! Prometheus metrics for the elector.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants and small recording helpers used by the
//! control loop, and exposes the `/metrics` endpoint handler.  Recording
//! without an installed recorder is a no-op, so library users that never
//! call [`init_metrics`] pay nothing.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Renewal cycles (counter). Labels: result (`ok`, `failed`).
pub const RENEWALS_TOTAL: &str = "elector_renewals_total";

/// Times this process observed itself become leader (counter).
pub const LEADER_ELECTED_TOTAL: &str = "elector_leader_elected_total";

/// Leader callback starts (counter).
pub const CALLBACK_STARTS_TOTAL: &str = "elector_callback_starts_total";

/// Resignations (counter). Labels: result (`ok`, `error`, `callback_exit`).
pub const RESIGNATIONS_TOTAL: &str = "elector_resignations_total";

/// 1 while this process holds a valid leader lease (gauge).
pub const IS_LEADER: &str = "elector_is_leader";

/// Members in the last observed record (gauge).
pub const MEMBERS: &str = "elector_members";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(RENEWALS_TOTAL, "Renewal cycles by result");
    describe_counter!(LEADER_ELECTED_TOTAL, "Times this process became leader");
    describe_counter!(CALLBACK_STARTS_TOTAL, "Leader callback starts");
    describe_counter!(RESIGNATIONS_TOTAL, "Leadership resignations by result");
    describe_gauge!(IS_LEADER, "Whether this process holds a valid leader lease");
    describe_gauge!(MEMBERS, "Members in the last observed election record");
}

// -- Recording helpers --------------------------------------------------------

pub(crate) fn record_renewal(ok: bool) {
    let result = if ok { "ok" } else { "failed" };
    counter!(RENEWALS_TOTAL, "result" => result).increment(1);
}

pub(crate) fn record_leadership(is_leader: bool, members: usize) {
    gauge!(IS_LEADER).set(if is_leader { 1.0 } else { 0.0 });
    gauge!(MEMBERS).set(members as f64);
}

pub(crate) fn record_elected() {
    counter!(LEADER_ELECTED_TOTAL).increment(1);
}

pub(crate) fn record_callback_start() {
    counter!(CALLBACK_STARTS_TOTAL).increment(1);
}

pub(crate) fn record_resignation(result: &'static str) {
    counter!(RESIGNATIONS_TOTAL, "result" => result).increment(1);
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; version=0.0.4")],
            "metrics disabled\n".to_string(),
        ),
    }
}

// -- Tests --------------------------------------------------------------------
