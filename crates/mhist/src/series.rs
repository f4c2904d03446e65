use parking_lot::RwLock;

use crate::{
    filter::{
        FilterDefinition,
        TimestampFilter,
    },
    measurement::{
        Measurement,
        MeasurementType,
    },
    metrics,
};

/// Per-name history of measurements of a single type, ordered by insertion
/// and assumed non-decreasing in timestamp. Created on first observation of
/// a name and kept for the process lifetime; contents shrink via
/// [`Series::cutoff_below`].
///
/// All mutation goes through the write half of one lock, so it is serialized
/// per series; queries take the read half and may observe a slightly stale
/// tail.
pub struct Series {
    measurement_type: MeasurementType,
    state: RwLock<SeriesState>,
}

#[derive(Default)]
struct SeriesState {
    measurements: Vec<Measurement>,
    size: usize,
}

impl Series {
    pub fn new(measurement_type: MeasurementType) -> Self {
        Self {
            measurement_type,
            state: RwLock::new(SeriesState::default()),
        }
    }

    pub fn measurement_type(&self) -> MeasurementType {
        self.measurement_type
    }

    /// Size of all measurements contained in the series.
    pub fn size(&self) -> usize {
        self.state.read().size
    }

    pub fn oldest_ts(&self) -> i64 {
        self.state.read().oldest_ts()
    }

    pub fn latest_ts(&self) -> i64 {
        self.state.read().latest_ts()
    }

    /// Append a measurement. Off-type measurements are dropped, not an error:
    /// the publisher is not authoritative on a name's schema.
    pub fn add(&self, measurement: Measurement) {
        if measurement.measurement_type() != self.measurement_type {
            metrics::log_series_type_mismatch();
            tracing::warn!(
                "Dropping {} measurement added to a {} series",
                measurement.measurement_type(),
                self.measurement_type,
            );
            return;
        }
        self.state.write().add(measurement);
    }

    /// Remove and return the prefix of measurements with timestamps at or
    /// below `lowest_ts`. A cutoff below the whole series returns nothing
    /// and does not mutate.
    pub fn cutoff_below(&self, lowest_ts: i64) -> Vec<Measurement> {
        self.state.write().cutoff_below(lowest_ts)
    }

    /// Copies of the measurements in approximately the given time range,
    /// decimated by the definition's granularity. The second return is true
    /// when older data may have been cut off before `start`.
    ///
    /// Start and end indices are estimated assuming equidistant timestamps;
    /// one boundary element per side may be missed.
    pub fn measurements_in_time_range(
        &self,
        start: i64,
        end: i64,
        definition: &FilterDefinition,
    ) -> (Vec<Measurement>, bool) {
        self.state
            .read()
            .measurements_in_time_range(start, end, definition)
    }
}

impl SeriesState {
    fn oldest_ts(&self) -> i64 {
        self.measurements.first().map_or(0, Measurement::timestamp)
    }

    fn latest_ts(&self) -> i64 {
        self.measurements.last().map_or(0, Measurement::timestamp)
    }

    fn add(&mut self, measurement: Measurement) {
        self.size += measurement.size();
        self.measurements.push(measurement);
    }

    fn cutoff_below(&mut self, lowest_ts: i64) -> Vec<Measurement> {
        if self.measurements.is_empty() || lowest_ts <= self.oldest_ts() {
            return Vec::new();
        }
        let index = self
            .measurements
            .iter()
            .position(|m| m.timestamp() > lowest_ts)
            .unwrap_or(self.measurements.len());
        let removed: usize = self.measurements[..index].iter().map(Measurement::size).sum();
        self.size -= removed;
        let remaining = self.measurements.split_off(index);
        std::mem::replace(&mut self.measurements, remaining)
    }

    fn measurements_in_time_range(
        &self,
        start: i64,
        end: i64,
        definition: &FilterDefinition,
    ) -> (Vec<Measurement>, bool) {
        if start > end || self.measurements.is_empty() {
            return (Vec::new(), false);
        }
        if start > self.latest_ts() || end < self.oldest_ts() {
            return (Vec::new(), false);
        }
        let start_index = self.index_above(start);
        let end_index = self.index_below(end);
        if start_index > end_index {
            return (Vec::new(), start_index == 0);
        }
        let mut filter = TimestampFilter::new(definition.granularity);
        let mut measurements = Vec::with_capacity(end_index - start_index + 1);
        for measurement in &self.measurements[start_index..=end_index] {
            if filter.passes(measurement) {
                measurements.push(measurement.clone());
            }
        }
        (measurements, start_index == 0)
    }

    /// Lowest index with a timestamp at or above `ts`, estimated by linear
    /// interpolation. Callers guarantee `ts <= latest_ts()`.
    fn index_above(&self, ts: i64) -> usize {
        if ts <= self.oldest_ts() {
            return 0;
        }
        let time_range = self.latest_ts() - self.oldest_ts();
        let pos_in_range = ts - self.oldest_ts();
        let index =
            pos_in_range as f64 / time_range as f64 * (self.measurements.len() - 1) as f64;
        index.ceil() as usize
    }

    /// Highest index with a timestamp at or below `ts`, estimated by linear
    /// interpolation. Callers guarantee `ts >= oldest_ts()`.
    fn index_below(&self, ts: i64) -> usize {
        if ts >= self.latest_ts() {
            return self.measurements.len() - 1;
        }
        let time_range = self.latest_ts() - self.oldest_ts();
        let pos_in_range = ts - self.oldest_ts();
        (pos_in_range as f64 / time_range as f64 * (self.measurements.len() - 1) as f64) as usize
    }
}
