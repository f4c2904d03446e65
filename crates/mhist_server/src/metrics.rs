use std::sync::LazyLock;

use prometheus::{
    register_int_counter,
    register_int_gauge,
    IntCounter,
    IntGauge,
};

static SUBSCRIBERS_CONNECTED: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "mhist_subscribers_connected",
        "Live subscriber connections"
    )
    .unwrap()
});
pub fn log_subscriber_count(count: usize) {
    SUBSCRIBERS_CONNECTED.set(count as i64);
}

static FANOUT_LINES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_fanout_lines_total",
        "Messages queued to subscriber connections"
    )
    .unwrap()
});
pub fn log_fanout_line() {
    FANOUT_LINES_TOTAL.inc();
}

static REJECTED_LINES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_rejected_lines_total",
        "Published lines dropped because they did not decode or validate"
    )
    .unwrap()
});
pub fn log_rejected_line() {
    REJECTED_LINES_TOTAL.inc();
}

static REPLICATION_DROPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_replication_dropped_total",
        "Measurements dropped because a replication peer queue was full"
    )
    .unwrap()
});
pub fn log_replication_dropped() {
    REPLICATION_DROPPED_TOTAL.inc();
}
