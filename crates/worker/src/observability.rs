use std::sync::OnceLock;

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const POLL_CYCLES_TOTAL: &str = "ember_worker_poll_cycles_total";
const POLL_CYCLE_DURATION_MS: &str = "ember_worker_poll_cycle_duration_ms";
const BOARDS_PROVISIONED_TOTAL: &str = "ember_worker_boards_provisioned_total";
const BOARDS_CLEANED_TOTAL: &str = "ember_worker_boards_cleaned_total";
const RECONCILE_RUNS_TOTAL: &str = "ember_worker_reconcile_runs_total";
const RECONCILE_DURATION_MS: &str = "ember_worker_reconcile_duration_ms";
const RECONCILE_PENDING_KEYS_GAUGE: &str = "ember_worker_reconcile_pending_keys_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn register_poll_cycle(result: &str, provisioned: u64, cleaned: u64, duration_ms: f64) {
    counter!(POLL_CYCLES_TOTAL, "result" => result.to_string()).increment(1);
    counter!(BOARDS_PROVISIONED_TOTAL).increment(provisioned);
    counter!(BOARDS_CLEANED_TOTAL).increment(cleaned);
    histogram!(POLL_CYCLE_DURATION_MS, "result" => result.to_string()).record(duration_ms);
}

pub fn register_reconcile_run(result: &str, keys: u64, duration_ms: f64) {
    counter!(RECONCILE_RUNS_TOTAL, "result" => result.to_string()).increment(1);
    gauge!(RECONCILE_PENDING_KEYS_GAUGE).set(keys as f64);
    histogram!(RECONCILE_DURATION_MS, "result" => result.to_string()).record(duration_ms);
}
