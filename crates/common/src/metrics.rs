use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

// Prometheus metrics (default registry), labelled by operation: get/set/delete
pub static STORE_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kv_store_operations_total",
        "Total store operations attempted",
        &["op"]
    )
    .expect("register kv_store_operations_total")
});

pub static STORE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kv_store_errors_total",
        "Total store operations that failed",
        &["op"]
    )
    .expect("register kv_store_errors_total")
});

pub fn record_operation(op: &str) {
    STORE_OPERATIONS_TOTAL.with_label_values(&[op]).inc();
}

pub fn record_error(op: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[op]).inc();
}

/// Text exposition of the default registry. Returns `Err` with a message if encoding fails.
pub fn encode_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("metrics encode error: {e}"))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics encode error: {e}"))
}
