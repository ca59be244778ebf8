//! Metrics collection and exposition.
//!
//! # Metrics
//! - `crm_ops_circuit_state` (gauge): 0=closed, 1=open, 2=half-open, by breaker
//! - `crm_ops_circuit_rejections_total` (counter): fast-failed calls, by breaker
//! - `crm_ops_backup_operations_total` (counter): by operation and outcome
//! - `crm_ops_backup_size_bytes` (gauge): size of the latest backup artifact
//! - `crm_ops_backups_pruned_total` (counter): backups removed by retention
//! - `crm_ops_operation_duration_seconds` (histogram): by operation
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests never need to call [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the current state of a circuit breaker.
pub fn record_circuit_state(breaker: &str, state_code: u8) {
    gauge!("crm_ops_circuit_state", "breaker" => breaker.to_string()).set(f64::from(state_code));
}

/// Record a call rejected by an open circuit.
pub fn record_circuit_rejection(breaker: &str) {
    counter!("crm_ops_circuit_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

/// Record the outcome of a backup operation (`create`, `restore`, `verify`, ...).
pub fn record_backup_operation(operation: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "crm_ops_backup_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the size of the most recent backup artifact.
pub fn record_backup_size(bytes: u64) {
    gauge!("crm_ops_backup_size_bytes").set(bytes as f64);
}

/// Record backups removed by retention pruning.
pub fn record_backups_pruned(count: usize) {
    counter!("crm_ops_backups_pruned_total").increment(count as u64);
}

/// Record how long a named operation took.
pub fn record_operation_duration(operation: &str, start: Instant) {
    histogram!(
        "crm_ops_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
