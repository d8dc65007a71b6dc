use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::logs::LogLevel;

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "opslog_entries_appended_total",
        "Total number of log entries stored"
    );
    describe_counter!(
        "opslog_entries_evicted_total",
        "Entries dropped from the ring to make room"
    );
    describe_counter!(
        "opslog_subscriber_overflows_total",
        "Times a stream subscriber's queue was full and its backlog dropped"
    );
    describe_counter!(
        "opslog_ingest_total",
        "External ingest attempts by outcome"
    );
    describe_gauge!("opslog_buffer_entries", "Entries currently retained");
    describe_gauge!("opslog_subscribers", "Live stream subscribers");
    describe_gauge!("opslog_info", "Service version information");

    gauge!("opslog_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a stored entry and the resulting ring occupancy
pub fn record_append(level: LogLevel, evicted: u64, buffered: usize) {
    counter!("opslog_entries_appended_total", "level" => level.as_str()).increment(1);
    if evicted > 0 {
        counter!("opslog_entries_evicted_total").increment(evicted);
    }
    gauge!("opslog_buffer_entries").set(buffered as f64);
}

pub fn record_overflows(count: usize) {
    counter!("opslog_subscriber_overflows_total").increment(count as u64);
}

pub fn set_subscribers(count: usize) {
    gauge!("opslog_subscribers").set(count as f64);
}

/// Record an ingest attempt; outcome is `accepted`, `unauthorized` or `invalid`
pub fn record_ingest(outcome: &'static str) {
    counter!("opslog_ingest_total", "outcome" => outcome).increment(1);
}
