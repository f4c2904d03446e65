use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    time::Duration,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::measurement::Measurement;

/// What a subscriber wants to see: a set of measurement names (empty set
/// means all of them) and a minimum spacing between delivered timestamps
/// (zero means all of them).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    #[serde(default, with = "duration_nanos")]
    pub granularity: Duration,
    #[serde(default)]
    pub names: BTreeSet<String>,
}

/// Durations cross the wire as integer nanoseconds.
mod duration_nanos {
    use std::time::Duration;

    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
    };

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

/// Admits a timestamp when it is at least one granularity past the last
/// admitted one. The first timestamp always passes; zero granularity admits
/// everything.
#[derive(Debug)]
pub struct TimestampFilter {
    granularity: i64,
    last_passed: Option<i64>,
}

impl TimestampFilter {
    pub fn new(granularity: Duration) -> Self {
        Self {
            granularity: granularity.as_nanos().try_into().unwrap_or(i64::MAX),
            last_passed: None,
        }
    }

    pub fn passes(&mut self, measurement: &Measurement) -> bool {
        if self.granularity == 0 {
            return true;
        }
        let ts = measurement.timestamp();
        let passes = match self.last_passed {
            None => true,
            Some(last_passed) => ts - last_passed >= self.granularity,
        };
        if passes {
            self.last_passed = Some(ts);
        }
        passes
    }
}

/// The immutable definition plus per-name decimator state. Each live
/// subscriber and each read query owns its own collection; it is not meant
/// to be shared.
#[derive(Debug)]
pub struct FilterCollection {
    definition: FilterDefinition,
    state: BTreeMap<String, TimestampFilter>,
}

impl FilterCollection {
    pub fn new(definition: FilterDefinition) -> Self {
        let state = definition
            .names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    TimestampFilter::new(definition.granularity),
                )
            })
            .collect();
        Self { definition, state }
    }

    pub fn passes(&mut self, name: &str, measurement: &Measurement) -> bool {
        if !self.definition.names.is_empty() && !self.definition.names.contains(name) {
            return false;
        }
        // An accept-all-names definition grows state on first sight of a name.
        self.state
            .entry(name.to_owned())
            .or_insert_with(|| TimestampFilter::new(self.definition.granularity))
            .passes(measurement)
    }
}
