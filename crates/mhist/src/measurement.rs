use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    errors::Error,
    pools::Pools,
};

/// The kind of value a series holds. The numeric codes are what the meta
/// catalog persists; they are fixed for the lifetime of a data directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MeasurementType {
    Numerical,
    Categorical,
}

impl MeasurementType {
    pub fn name(self) -> &'static str {
        match self {
            MeasurementType::Numerical => "numerical",
            MeasurementType::Categorical => "categorical",
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<MeasurementType> for u8 {
    fn from(measurement_type: MeasurementType) -> u8 {
        match measurement_type {
            MeasurementType::Numerical => 1,
            MeasurementType::Categorical => 2,
        }
    }
}

impl TryFrom<u8> for MeasurementType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            1 => Ok(MeasurementType::Numerical),
            2 => Ok(MeasurementType::Categorical),
            _ => Err(Error::MalformedInput(format!(
                "unknown measurement type code {code}"
            ))),
        }
    }
}

/// A single timestamped observation. Timestamps are microseconds since the
/// Unix epoch; within one series they are expected to be non-decreasing.
#[derive(Clone, Debug, PartialEq)]
pub enum Measurement {
    Numerical { ts: i64, value: f64 },
    Categorical { ts: i64, value: String },
}

impl Measurement {
    pub fn numerical(ts: i64, value: f64) -> Self {
        Measurement::Numerical { ts, value }
    }

    pub fn categorical(ts: i64, value: impl Into<String>) -> Self {
        Measurement::Categorical {
            ts,
            value: value.into(),
        }
    }

    /// An all-zero measurement of the given type, as allocated by the pools.
    pub fn empty(measurement_type: MeasurementType) -> Self {
        match measurement_type {
            MeasurementType::Numerical => Measurement::Numerical { ts: 0, value: 0. },
            MeasurementType::Categorical => Measurement::Categorical {
                ts: 0,
                value: String::new(),
            },
        }
    }

    pub fn measurement_type(&self) -> MeasurementType {
        match self {
            Measurement::Numerical { .. } => MeasurementType::Numerical,
            Measurement::Categorical { .. } => MeasurementType::Categorical,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Measurement::Numerical { ts, .. } | Measurement::Categorical { ts, .. } => *ts,
        }
    }

    /// Byte footprint used for memory accounting.
    pub fn size(&self) -> usize {
        match self {
            Measurement::Numerical { .. } => 16,
            Measurement::Categorical { value, .. } => 16 + value.len(),
        }
    }

    /// The opaque payload as carried in the wire envelope.
    pub fn value_json(&self) -> serde_json::Value {
        match self {
            Measurement::Numerical { value, .. } => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Measurement::Categorical { value, .. } => serde_json::Value::String(value.clone()),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Measurement::Numerical { ts, value } => {
                *ts = 0;
                *value = 0.;
            },
            Measurement::Categorical { ts, value } => {
                *ts = 0;
                value.clear();
            },
        }
    }

    /// Overwrite `self` with `other`'s fields, keeping `self`'s allocation
    /// when the variants line up.
    pub fn assign(&mut self, other: &Measurement) {
        match (self, other) {
            (
                Measurement::Numerical { ts, value },
                Measurement::Numerical {
                    ts: other_ts,
                    value: other_value,
                },
            ) => {
                *ts = *other_ts;
                *value = *other_value;
            },
            (
                Measurement::Categorical { ts, value },
                Measurement::Categorical {
                    ts: other_ts,
                    value: other_value,
                },
            ) => {
                *ts = *other_ts;
                value.clear();
                value.push_str(other_value);
            },
            (this, other) => *this = other.clone(),
        }
    }

    /// Pool-backed deep copy.
    pub fn copy_from(&self, pools: &Pools) -> Measurement {
        let mut copy = pools.get_measurement(self.measurement_type());
        copy.assign(self);
        copy
    }
}
