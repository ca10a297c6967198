// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Every counter the service emits, with its description.
pub const COUNTERS: &[(&str, &str)] = &[
    ("search_requests_total", "Search pages requested upstream."),
    (
        "search_accepted_total",
        "Candidates followed or delegated by searches.",
    ),
    (
        "policy_rejected_total",
        "Candidates rejected by the eligibility policy, by rule.",
    ),
    ("stream_events_total", "Live stream update events received."),
    (
        "stream_written_total",
        "Normalized events accepted by the writer.",
    ),
    (
        "stream_follow_requests_total",
        "Follow requests sent for locked live stream authors.",
    ),
    (
        "stream_reconnects_total",
        "Live stream reconnects after a terminal error.",
    ),
];

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        for (name, help) in COUNTERS {
            describe_counter!(*name, *help);
        }
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the Prometheus recorder.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
