use std::sync::LazyLock;

use prometheus::{
    register_histogram,
    register_int_counter,
    register_int_gauge,
    Histogram,
    HistogramTimer,
    IntCounter,
    IntGauge,
};

static MEASUREMENTS_INGESTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_measurements_ingested_total",
        "Number of measurements accepted into the store fanout"
    )
    .unwrap()
});
pub fn log_measurement_ingested() {
    MEASUREMENTS_INGESTED_TOTAL.inc();
}

static SERIES_TYPE_MISMATCH_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_series_type_mismatch_total",
        "Measurements dropped because their type differs from their series"
    )
    .unwrap()
});
pub fn log_series_type_mismatch() {
    SERIES_TYPE_MISMATCH_TOTAL.inc();
}

static META_TYPE_MISMATCH_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_meta_type_mismatch_total",
        "Measurements dropped by the disk store because the name is registered with another type"
    )
    .unwrap()
});
pub fn log_meta_type_mismatch() {
    META_TYPE_MISMATCH_TOTAL.inc();
}

static MEMORY_SIZE_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "mhist_memory_size_bytes",
        "Total footprint of the in-memory series tier"
    )
    .unwrap()
});
pub fn log_memory_size(size: usize) {
    MEMORY_SIZE_BYTES.set(size as i64);
}

static SHRINK_EVICTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_shrink_evicted_total",
        "Measurements evicted from memory by pool-triggered shrinks"
    )
    .unwrap()
});
pub fn log_shrink(evicted: usize) {
    SHRINK_EVICTED_TOTAL.inc_by(evicted as u64);
}

static DISK_COMMIT_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "mhist_disk_commit_seconds",
        "Time spent committing a block to disk"
    )
    .unwrap()
});
pub fn commit_timer() -> HistogramTimer {
    DISK_COMMIT_SECONDS.start_timer()
}

static DISK_COMMITTED_BYTES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_disk_committed_bytes_total",
        "Block bytes handed to the file layer"
    )
    .unwrap()
});
pub fn log_commit_bytes(bytes: usize) {
    DISK_COMMITTED_BYTES_TOTAL.inc_by(bytes as u64);
}

static DISK_COMMIT_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_disk_commit_errors_total",
        "Commits that failed and lost their block"
    )
    .unwrap()
});
pub fn log_commit_error() {
    DISK_COMMIT_ERRORS_TOTAL.inc();
}

static DISK_SIZE_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "mhist_disk_size_bytes",
        "Total size of all block files after the last commit"
    )
    .unwrap()
});
pub fn log_disk_size(size: i64) {
    DISK_SIZE_BYTES.set(size);
}

static DISK_FILES_EVICTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_disk_files_evicted_total",
        "Oldest block files removed to stay under the disk budget"
    )
    .unwrap()
});
pub fn log_file_evicted() {
    DISK_FILES_EVICTED_TOTAL.inc();
}

static MALFORMED_LINES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "mhist_malformed_lines_total",
        "Block lines skipped on replay because they did not parse"
    )
    .unwrap()
});
pub fn log_malformed_line() {
    MALFORMED_LINES_TOTAL.inc();
}
