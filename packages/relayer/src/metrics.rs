//! Prometheus metrics for the burn/mint relayer
//!
//! Exposed on /metrics by the `watch` command's health server.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Scan metrics
    pub static ref BLOCKS_SCANNED: CounterVec = register_counter_vec!(
        "burnmint_blocks_scanned_total",
        "Total number of source blocks scanned for burns",
        &["chain"]
    ).unwrap();

    pub static ref LOG_REQUESTS: CounterVec = register_counter_vec!(
        "burnmint_log_requests_total",
        "Total number of windowed eth_getLogs requests",
        &["chain"]
    ).unwrap();

    pub static ref BURN_EVENTS_DETECTED: CounterVec = register_counter_vec!(
        "burnmint_burn_events_detected_total",
        "Total number of TokensBurned events decoded",
        &["chain"]
    ).unwrap();

    pub static ref CURSOR_BLOCK: GaugeVec = register_gauge_vec!(
        "burnmint_cursor_block",
        "Last processed block persisted for the source chain",
        &["chain"]
    ).unwrap();

    // Relay metrics
    pub static ref MINTS_SUBMITTED: CounterVec = register_counter_vec!(
        "burnmint_mints_submitted_total",
        "Total number of relayed mint submissions",
        &["chain", "status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "burnmint_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "burnmint_up",
        "Whether the relayer is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "burnmint_last_successful_poll_timestamp",
        "Unix timestamp of the last poll that scanned cleanly and relayed every burn found",
        &["chain"]
    ).unwrap();
}

/// Record one windowed log query
pub fn record_window_scanned(chain: &str, from_block: u64, to_block: u64) {
    LOG_REQUESTS.with_label_values(&[chain]).inc();
    BLOCKS_SCANNED
        .with_label_values(&[chain])
        .inc_by((to_block - from_block + 1) as f64);
}

/// Record decoded burn events
pub fn record_burns_detected(chain: &str, count: usize) {
    BURN_EVENTS_DETECTED
        .with_label_values(&[chain])
        .inc_by(count as f64);
}

/// Record a mint submission
pub fn record_mint_submitted(chain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    MINTS_SUBMITTED.with_label_values(&[chain, status]).inc();
}

/// Record the persisted cursor
pub fn set_cursor(chain: &str, block: u64) {
    CURSOR_BLOCK.with_label_values(&[chain]).set(block as f64);
}

/// Record an error
pub fn record_error(chain: &str, error_type: &str) {
    ERRORS.with_label_values(&[chain, error_type]).inc();
}

/// Record last successful poll
pub fn record_successful_poll(chain: &str) {
    LAST_SUCCESSFUL_POLL
        .with_label_values(&[chain])
        .set(chrono::Utc::now().timestamp() as f64);
}
