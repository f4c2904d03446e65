//! Helpers shared between the crate's tests.

use crate::{
    measurement::Measurement,
    series::Series,
};

/// `amount` numerical measurements starting at `start_ts`, spaced by
/// `increment`, with values counting up from 10.
pub fn sample_measurements(amount: i64, start_ts: i64, increment: i64) -> Vec<Measurement> {
    (0..amount)
        .map(|i| Measurement::numerical(start_ts + increment * i, (10 + i) as f64))
        .collect()
}

/// Five sample measurements at timestamps 1000..=1040, 16 bytes each.
pub fn add_sample_measurements(series: &Series) {
    for measurement in sample_measurements(5, 1000, 10) {
        series.add(measurement);
    }
}
