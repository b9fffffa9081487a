//! Feed Ranking Metrics
//!
//! Prometheus metrics for feed composition and view recording

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_requests_total",
        "Feed requests by mode and outcome (ok/missing_prerequisite/error)",
        &["mode", "status"]
    )
    .expect("Failed to register feed requests metric")
});

static FEED_COMPOSE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_compose_duration_seconds",
        "Time spent composing one feed page",
        &["mode"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register feed compose duration metric")
});

static FEED_CANDIDATES_SKIPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_candidates_skipped_total",
        "Candidates dropped because their stored data was malformed",
        &["mode"]
    )
    .expect("Failed to register skipped candidates metric")
});

static FEED_INVALID_CURSORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_invalid_cursors_total",
        "Cursors that could not be decoded and fell back to the first page"
    )
    .expect("Failed to register invalid cursor metric")
});

static FEED_VIEWS_RECORDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_views_recorded_total",
        "Log views recorded (success/error)",
        &["status"]
    )
    .expect("Failed to register recorded views metric")
});

pub fn record_feed_request(mode: &str, status: &str) {
    FEED_REQUESTS_TOTAL.with_label_values(&[mode, status]).inc();
}

pub fn record_compose_duration(mode: &str, duration: Duration) {
    FEED_COMPOSE_DURATION_SECONDS
        .with_label_values(&[mode])
        .observe(duration.as_secs_f64());
}

pub fn record_skipped_candidates(mode: &str, count: usize) {
    if count > 0 {
        FEED_CANDIDATES_SKIPPED_TOTAL
            .with_label_values(&[mode])
            .inc_by(count as u64);
    }
}

pub fn record_invalid_cursor() {
    FEED_INVALID_CURSORS_TOTAL.inc();
}

pub fn record_views(status: &str, count: usize) {
    FEED_VIEWS_RECORDED_TOTAL
        .with_label_values(&[status])
        .inc_by(count as u64);
}

/// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
