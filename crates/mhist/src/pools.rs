use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        OnceLock,
    },
};

use parking_lot::Mutex;

use crate::{
    measurement::{
        Measurement,
        MeasurementType,
    },
    message::Message,
};

/// Measurements evicted from the memory tier, grouped by type, on their way
/// into the pools.
pub type MeasurementSlices = BTreeMap<MeasurementType, Vec<Measurement>>;

/// Implemented by the in-memory tier. Lets the pools turn memory pressure
/// into recycled measurement records instead of fresh allocations.
pub trait Shrinker: Send + Sync {
    fn is_over_soft_limit(&self) -> bool;
    fn is_over_max_size(&self) -> bool;
    /// Evict enough of the oldest data to get back under the soft limit and
    /// hand it over.
    fn shrink(&self) -> MeasurementSlices;
}

/// Free lists for measurement and message records. Items come back from
/// [`Pools::put_measurement`] / [`Pools::put_message`] and from the memory
/// tier's eviction path; they are returned unreset, consumers overwrite
/// every field before use.
pub struct Pools {
    shrinker: OnceLock<Arc<dyn Shrinker>>,
    numerical: Mutex<Vec<Measurement>>,
    categorical: Mutex<Vec<Measurement>>,
    messages: Mutex<Vec<Message>>,
}

impl Pools {
    pub fn new() -> Self {
        Self {
            shrinker: OnceLock::new(),
            numerical: Mutex::new(Vec::new()),
            categorical: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Attached after construction: the memory store needs the pools to copy
    /// measurements and the pools need the memory store to shrink, so one of
    /// the two references has to arrive late.
    pub fn attach_shrinker(&self, shrinker: Arc<dyn Shrinker>) {
        if self.shrinker.set(shrinker).is_err() {
            tracing::warn!("Pools already have a shrinker attached, ignoring the new one");
        }
    }

    pub fn get_numerical(&self) -> Measurement {
        self.get_measurement(MeasurementType::Numerical)
    }

    pub fn get_categorical(&self) -> Measurement {
        self.get_measurement(MeasurementType::Categorical)
    }

    pub fn get_measurement(&self, measurement_type: MeasurementType) -> Measurement {
        if let Some(measurement) = self.free_list(measurement_type).lock().pop() {
            return measurement;
        }
        if let Some(mut slices) = self.grab_slices() {
            let recycled = slices
                .get_mut(&measurement_type)
                .and_then(|slice| slice.pop());
            self.fill(slices);
            if let Some(measurement) = recycled {
                return measurement;
            }
        }
        Measurement::empty(measurement_type)
    }

    pub fn put_measurement(&self, measurement: Measurement) {
        self.free_list(measurement.measurement_type())
            .lock()
            .push(measurement);
    }

    pub fn get_message(&self) -> Message {
        self.messages.lock().pop().unwrap_or_default()
    }

    pub fn put_message(&self, message: Message) {
        self.messages.lock().push(message);
    }

    fn free_list(&self, measurement_type: MeasurementType) -> &Mutex<Vec<Measurement>> {
        match measurement_type {
            MeasurementType::Numerical => &self.numerical,
            MeasurementType::Categorical => &self.categorical,
        }
    }

    /// Eviction stock is only worth taking when the shrink actually got the
    /// memory tier back under its maximum; otherwise the slices are dropped
    /// and reclaimed wholesale.
    fn grab_slices(&self) -> Option<MeasurementSlices> {
        let shrinker = self.shrinker.get()?;
        if !shrinker.is_over_soft_limit() {
            return None;
        }
        let slices = shrinker.shrink();
        if shrinker.is_over_max_size() {
            return None;
        }
        Some(slices)
    }

    fn fill(&self, slices: MeasurementSlices) {
        for (measurement_type, slice) in slices {
            self.free_list(measurement_type).lock().extend(slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        Mutex,
    };

    use super::{
        MeasurementSlices,
        Pools,
        Shrinker,
    };
    use crate::measurement::{
        Measurement,
        MeasurementType,
    };

    struct FakeShrinker {
        over_soft_limit: bool,
        over_max_size: bool,
        stock: Mutex<MeasurementSlices>,
        shrinks: Mutex<usize>,
    }

    impl FakeShrinker {
        fn new(over_soft_limit: bool, over_max_size: bool, stock: MeasurementSlices) -> Arc<Self> {
            Arc::new(Self {
                over_soft_limit,
                over_max_size,
                stock: Mutex::new(stock),
                shrinks: Mutex::new(0),
            })
        }
    }

    impl Shrinker for FakeShrinker {
        fn is_over_soft_limit(&self) -> bool {
            self.over_soft_limit
        }

        fn is_over_max_size(&self) -> bool {
            self.over_max_size
        }

        fn shrink(&self) -> MeasurementSlices {
            *self.shrinks.lock().unwrap() += 1;
            std::mem::take(&mut *self.stock.lock().unwrap())
        }
    }

    #[test]
    fn test_get_prefers_free_list() {
        let pools = Pools::new();
        pools.put_measurement(Measurement::numerical(1000, 42.));
        assert_eq!(pools.get_numerical(), Measurement::numerical(1000, 42.));
        // Free list exhausted, no shrinker: fresh allocation.
        assert_eq!(
            pools.get_numerical(),
            Measurement::empty(MeasurementType::Numerical)
        );
    }

    #[test]
    fn test_get_harvests_shrink_stock() {
        let mut stock = MeasurementSlices::new();
        stock.insert(
            MeasurementType::Numerical,
            vec![Measurement::numerical(1, 1.), Measurement::numerical(2, 2.)],
        );
        stock.insert(
            MeasurementType::Categorical,
            vec![Measurement::categorical(3, "x")],
        );

        let pools = Pools::new();
        let shrinker = FakeShrinker::new(true, false, stock);
        pools.attach_shrinker(shrinker.clone());

        let measurement = pools.get_numerical();
        assert_eq!(measurement.measurement_type(), MeasurementType::Numerical);
        assert_eq!(*shrinker.shrinks.lock().unwrap(), 1);

        // The rest of the stock refilled the free lists, so further gets
        // don't shrink again.
        let _ = pools.get_numerical();
        let _ = pools.get_categorical();
        assert_eq!(*shrinker.shrinks.lock().unwrap(), 1);
    }

    #[test]
    fn test_get_discards_stock_when_still_over_max() {
        let mut stock = MeasurementSlices::new();
        stock.insert(
            MeasurementType::Numerical,
            vec![Measurement::numerical(1, 1.)],
        );

        let pools = Pools::new();
        let shrinker = FakeShrinker::new(true, true, stock);
        pools.attach_shrinker(shrinker.clone());

        assert_eq!(
            pools.get_numerical(),
            Measurement::empty(MeasurementType::Numerical)
        );
        assert_eq!(*shrinker.shrinks.lock().unwrap(), 1);
    }

    #[test]
    fn test_get_under_soft_limit_allocates_fresh() {
        let pools = Pools::new();
        let shrinker = FakeShrinker::new(false, false, MeasurementSlices::new());
        pools.attach_shrinker(shrinker.clone());

        assert_eq!(
            pools.get_categorical(),
            Measurement::empty(MeasurementType::Categorical)
        );
        assert_eq!(*shrinker.shrinks.lock().unwrap(), 0);
    }

    #[test]
    fn test_message_pool_recycles() {
        let pools = Pools::new();
        let mut message = pools.get_message();
        message.name.push_str("temp");
        pools.put_message(message);
        let recycled = pools.get_message();
        assert_eq!(recycled.name, "temp");
    }
}
