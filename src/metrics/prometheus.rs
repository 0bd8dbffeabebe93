use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus HTTP exporter on the given port.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, histogram!) are automatically exported at /metrics.
pub fn init_metrics_server(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;
    Ok(())
}

// ── Snapshot metrics ─────────────────────────────────────────────

pub fn record_snapshot(outcome: &'static str) {
    counter!("snapshot_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_snapshot_latency(latency_ms: f64) {
    histogram!("snapshot_request_latency_ms").record(latency_ms);
}

pub fn set_tracked_assets(count: usize) {
    gauge!("tracked_assets").set(count as f64);
}

// ── Stream metrics ───────────────────────────────────────────────

pub fn record_push(outcome: &'static str) {
    counter!("push_updates_total", "outcome" => outcome).increment(1);
}

pub fn record_connection_state(state: &'static str) {
    counter!("stream_connection_transitions_total", "state" => state).increment(1);
}

// ── Alert metrics ────────────────────────────────────────────────

pub fn record_alert(asset_id: &str, outcome: &'static str) {
    counter!("price_alerts_total", "asset" => asset_id.to_string(), "outcome" => outcome)
        .increment(1);
}
