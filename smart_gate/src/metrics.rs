use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

use crate::access::Decision;

lazy_static! {
    pub static ref FRAMES_PROCESSED: IntCounter = register_int_counter!(
        "smart_gate_frames_processed_total",
        "Frames that went through detection"
    )
    .expect("metric registers once");
    pub static ref REGIONS_DETECTED: IntCounter = register_int_counter!(
        "smart_gate_regions_detected_total",
        "Candidate plate regions above the minimum area"
    )
    .expect("metric registers once");
    pub static ref RECOGNITION_FAILURES: IntCounter = register_int_counter!(
        "smart_gate_recognition_failures_total",
        "Regions for which the recognizer failed"
    )
    .expect("metric registers once");
    pub static ref FRAGMENTS_REJECTED: IntCounter = register_int_counter!(
        "smart_gate_fragments_rejected_total",
        "Recognized fragments that did not validate as a plate"
    )
    .expect("metric registers once");
    pub static ref DECISIONS: IntCounterVec = register_int_counter_vec!(
        "smart_gate_decisions_total",
        "Access decisions by outcome",
        &["outcome"]
    )
    .expect("metric registers once");
    pub static ref STORE_FAILURES: IntCounter = register_int_counter!(
        "smart_gate_store_failures_total",
        "Access decisions that failed on the persistence store"
    )
    .expect("metric registers once");
    pub static ref FRAME_SECONDS: Histogram = register_histogram!(
        "smart_gate_frame_seconds",
        "Wall time spent processing one frame"
    )
    .expect("metric registers once");
}

pub fn record_decision(decision: Decision) {
    DECISIONS.with_label_values(&[decision.as_str()]).inc();
}

/// Text exposition of every registered metric.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        log::error!("Failed to encode metrics: {err}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
