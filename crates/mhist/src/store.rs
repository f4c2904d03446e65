use std::{
    collections::HashMap,
    sync::Arc,
};

use async_trait::async_trait;

use crate::{
    disk_store::DiskStore,
    filter::FilterDefinition,
    measurement::Measurement,
    meta::MeasurementTypeInfo,
    metrics,
};

/// Receives every measurement accepted into the fanout.
///
/// The measurement is only borrowed for the duration of the call; an
/// implementation that keeps it must take a pool-backed copy.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn notify(&self, name: &str, measurement: &Measurement);
}

/// Fan-out façade over subscribers and replication peers. Assembled once at
/// bootstrap, then shared immutably.
pub struct Store {
    subscribers: Vec<Arc<dyn Subscriber>>,
    replications: Vec<Arc<dyn Subscriber>>,
    disk_store: Option<Arc<DiskStore>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            replications: Vec::new(),
            disk_store: None,
        }
    }

    pub fn add_subscriber(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn add_replication(&mut self, replication: Arc<dyn Subscriber>) {
        self.replications.push(replication);
    }

    /// The disk store both subscribes to the fanout and serves the read
    /// path.
    pub fn attach_disk_store(&mut self, disk_store: Arc<DiskStore>) {
        self.disk_store = Some(disk_store.clone());
        self.add_subscriber(disk_store);
    }

    /// Notify every subscriber, and every replication peer unless the write
    /// is itself a replicated copy (which would loop it back). Notification
    /// is synchronous and serial within one call.
    pub async fn add(&self, name: &str, measurement: &Measurement, is_replication: bool) {
        if !is_replication {
            for replication in &self.replications {
                replication.notify(name, measurement).await;
            }
        }
        for subscriber in &self.subscribers {
            subscriber.notify(name, measurement).await;
        }
        metrics::log_measurement_ingested();
    }

    pub async fn measurements_in_time_range(
        &self,
        start: i64,
        end: i64,
        definition: &FilterDefinition,
    ) -> HashMap<String, Vec<Measurement>> {
        match &self.disk_store {
            Some(disk_store) => {
                disk_store
                    .measurements_in_time_range(start, end, definition)
                    .await
            },
            None => HashMap::new(),
        }
    }

    pub async fn stored_meta_info(&self) -> Vec<MeasurementTypeInfo> {
        match &self.disk_store {
            Some(disk_store) => disk_store.stored_meta_info().await,
            None => {
                tracing::warn!("No disk store attached, can't access measurement metadata");
                Vec::new()
            },
        }
    }

    pub async fn shutdown(&self) {
        if let Some(disk_store) = &self.disk_store {
            disk_store.shutdown().await;
        }
    }
}
