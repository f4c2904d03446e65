//! Core of the measurement history service: the in-memory series tier, the
//! pool layer feeding on its eviction path, the CSV-backed disk store, and
//! the fan-out façade tying them together.

pub mod block;
pub mod csv;
pub mod disk_store;
pub mod errors;
pub mod file_layout;
pub mod filter;
pub mod knobs;
pub mod measurement;
pub mod memory;
pub mod message;
pub mod meta;
mod metrics;
pub mod pools;
pub mod series;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::{
    disk_store::{
        DiskStore,
        DiskStoreConfig,
    },
    errors::{
        Error,
        Result,
    },
    filter::{
        FilterCollection,
        FilterDefinition,
        TimestampFilter,
    },
    measurement::{
        Measurement,
        MeasurementType,
    },
    memory::MemoryStore,
    message::{
        Message,
        SubscriptionMessage,
    },
    meta::MeasurementTypeInfo,
    pools::{
        MeasurementSlices,
        Pools,
        Shrinker,
    },
    series::Series,
    store::{
        Store,
        Subscriber,
    },
};
