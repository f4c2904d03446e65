use std::{
    collections::HashMap,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    filter::FilterDefinition,
    measurement::Measurement,
    metrics,
    pools::{
        MeasurementSlices,
        Pools,
        Shrinker,
    },
    series::Series,
    store::Subscriber,
};

/// The in-memory tier: one [`Series`] per measurement name, created on first
/// observation. Its aggregate footprint is bounded by the pool-triggered
/// shrink path rather than by refusing writes.
pub struct MemoryStore {
    pools: Arc<Pools>,
    series: RwLock<HashMap<String, Arc<Series>>>,
    soft_limit: usize,
    max_size: usize,
}

impl MemoryStore {
    pub fn new(pools: Arc<Pools>, soft_limit: usize, max_size: usize) -> Arc<Self> {
        Arc::new(Self {
            pools,
            series: RwLock::new(HashMap::new()),
            soft_limit,
            max_size,
        })
    }

    pub fn total_size(&self) -> usize {
        self.series.read().values().map(|series| series.size()).sum()
    }

    /// Merged per-series range queries. The incomplete bit is set when any
    /// series may have cut off data before `start`.
    pub fn measurements_in_time_range(
        &self,
        start: i64,
        end: i64,
        definition: &FilterDefinition,
    ) -> (HashMap<String, Vec<Measurement>>, bool) {
        let series: Vec<(String, Arc<Series>)> = self
            .series
            .read()
            .iter()
            .map(|(name, series)| (name.clone(), series.clone()))
            .collect();

        let mut result = HashMap::new();
        let mut possibly_incomplete = false;
        for (name, series) in series {
            if !definition.names.is_empty() && !definition.names.contains(&name) {
                continue;
            }
            let (measurements, incomplete) =
                series.measurements_in_time_range(start, end, definition);
            possibly_incomplete |= incomplete;
            if !measurements.is_empty() {
                result.insert(name, measurements);
            }
        }
        (result, possibly_incomplete)
    }

    fn series_for(&self, name: &str, measurement: &Measurement) -> Arc<Series> {
        if let Some(series) = self.series.read().get(name) {
            return series.clone();
        }
        self.series
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Series::new(measurement.measurement_type())))
            .clone()
    }

    fn series_snapshot(&self) -> Vec<Arc<Series>> {
        self.series.read().values().cloned().collect()
    }
}

#[async_trait]
impl Subscriber for MemoryStore {
    async fn notify(&self, name: &str, measurement: &Measurement) {
        let copy = measurement.copy_from(&self.pools);
        self.series_for(name, measurement).add(copy);
        metrics::log_memory_size(self.total_size());
    }
}

impl Shrinker for MemoryStore {
    fn is_over_soft_limit(&self) -> bool {
        self.total_size() > self.soft_limit
    }

    fn is_over_max_size(&self) -> bool {
        self.total_size() > self.max_size
    }

    /// Cut every series below a cutoff found by halving the populated time
    /// window, moving the cutoff halfway toward the latest timestamp until
    /// the remaining footprint fits under the soft limit.
    fn shrink(&self) -> MeasurementSlices {
        let mut slices = MeasurementSlices::new();
        let series = self.series_snapshot();
        let populated: Vec<&Arc<Series>> = series.iter().filter(|s| s.size() > 0).collect();
        let Some(oldest) = populated.iter().map(|s| s.oldest_ts()).min() else {
            return slices;
        };
        let latest = populated
            .iter()
            .map(|s| s.latest_ts())
            .max()
            .unwrap_or(oldest);

        let mut evicted = 0;
        let mut cutoff = oldest + (latest - oldest) / 2;
        loop {
            for series in &populated {
                for measurement in series.cutoff_below(cutoff) {
                    evicted += 1;
                    slices
                        .entry(measurement.measurement_type())
                        .or_default()
                        .push(measurement);
                }
            }
            if self.total_size() <= self.soft_limit || cutoff >= latest {
                break;
            }
            let next = cutoff + (latest - cutoff) / 2;
            cutoff = if next == cutoff { latest } else { next };
        }

        tracing::info!(
            "Shrunk the memory tier to {} bytes, recycling {evicted} measurements",
            self.total_size(),
        );
        metrics::log_shrink(evicted);
        metrics::log_memory_size(self.total_size());
        slices
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use super::MemoryStore;
    use crate::{
        filter::FilterDefinition,
        measurement::Measurement,
        pools::{
            Pools,
            Shrinker,
        },
        store::Subscriber,
    };

    fn memory_store(soft_limit: usize, max_size: usize) -> Arc<MemoryStore> {
        let pools = Arc::new(Pools::new());
        let memory = MemoryStore::new(pools.clone(), soft_limit, max_size);
        pools.attach_shrinker(memory.clone());
        memory
    }

    #[tokio::test]
    async fn test_notify_creates_series_per_name() {
        let memory = memory_store(1024, 2048);
        memory.notify("temp", &Measurement::numerical(1000, 20.)).await;
        memory.notify("temp", &Measurement::numerical(2000, 21.)).await;
        memory.notify("power", &Measurement::categorical(1500, "on")).await;

        let (result, _) =
            memory.measurements_in_time_range(0, 3000, &FilterDefinition::default());
        assert_eq!(result.len(), 2);
        assert_eq!(result["temp"].len(), 2);
        assert_eq!(result["power"], vec![Measurement::categorical(1500, "on")]);
        assert_eq!(memory.total_size(), 16 + 16 + 18);
    }

    #[tokio::test]
    async fn test_query_respects_name_set() {
        let memory = memory_store(1024, 2048);
        memory.notify("a", &Measurement::numerical(1000, 1.)).await;
        memory.notify("b", &Measurement::numerical(1000, 2.)).await;

        let definition = FilterDefinition {
            granularity: Duration::ZERO,
            names: ["a".to_owned()].into(),
        };
        let (result, _) = memory.measurements_in_time_range(0, 2000, &definition);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("a"));
    }

    #[tokio::test]
    async fn test_query_decimates_by_granularity() {
        let memory = memory_store(1024, 2048);
        for ts in [1_000_000, 2_000_000, 3_000_000, 4_000_000] {
            memory.notify("x", &Measurement::numerical(ts, ts as f64)).await;
        }

        let definition = FilterDefinition {
            granularity: Duration::from_millis(2),
            names: ["x".to_owned()].into(),
        };
        let (result, _) = memory.measurements_in_time_range(0, 5_000_000, &definition);
        let timestamps: Vec<i64> = result["x"].iter().map(Measurement::timestamp).collect();
        assert_eq!(timestamps, vec![1_000_000, 3_000_000]);
    }

    #[tokio::test]
    async fn test_shrink_gets_under_soft_limit() {
        // Eight 16-byte measurements against a 64-byte soft limit.
        let memory = memory_store(64, 1024);
        for i in 0..8 {
            memory
                .notify("temp", &Measurement::numerical(1000 + i * 10, i as f64))
                .await;
        }
        assert!(memory.is_over_soft_limit());

        let slices = memory.shrink();
        assert!(!memory.is_over_soft_limit());
        let evicted: usize = slices.values().map(Vec::len).sum();
        assert_eq!(evicted * 16 + memory.total_size(), 8 * 16);
        assert!(evicted > 0);
    }

    #[tokio::test]
    async fn test_shrink_on_empty_store() {
        let memory = memory_store(64, 1024);
        assert!(memory.shrink().is_empty());
    }
}
