use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{
    mpsc,
    oneshot,
};

use crate::{
    block::Block,
    csv,
    errors::{
        Error,
        Result,
    },
    file_layout::{
        self,
        FileLayout,
    },
    filter::{
        FilterCollection,
        FilterDefinition,
    },
    knobs::{
        BLOCK_SOFT_CAP_BYTES,
        DISK_QUEUE_SIZE,
    },
    measurement::{
        Measurement,
        MeasurementType,
    },
    meta::{
        DiskMeta,
        MeasurementTypeInfo,
    },
    metrics,
    pools::Pools,
    store::Subscriber,
};

#[derive(Clone, Debug)]
pub struct DiskStoreConfig {
    pub data_path: PathBuf,
    /// Rotate to a new block file once the newest one reaches this size.
    pub max_file_size: i64,
    /// Remove the oldest block file once the directory total crosses this.
    pub max_disk_size: i64,
    pub flush_interval: Duration,
    /// Commit ahead of the flush tick once the block buffer exceeds this.
    pub block_soft_cap: usize,
}

impl DiskStoreConfig {
    pub fn new(data_path: impl Into<PathBuf>, max_file_size: i64, max_disk_size: i64) -> Self {
        Self {
            data_path: data_path.into(),
            max_file_size,
            max_disk_size,
            flush_interval: Duration::from_secs(5),
            block_soft_cap: *BLOCK_SOFT_CAP_BYTES,
        }
    }
}

struct AddRequest {
    name: String,
    measurement: Measurement,
    done: oneshot::Sender<()>,
}

struct ReadRequest {
    start: i64,
    end: i64,
    definition: FilterDefinition,
    result: oneshot::Sender<HashMap<String, Vec<Measurement>>>,
}

/// Client handle to the single-writer disk worker, which owns the block
/// buffer, the meta catalog and all file IO. Every request is serviced by
/// the worker in arrival order per channel.
pub struct DiskStore {
    add_tx: mpsc::Sender<AddRequest>,
    read_tx: mpsc::Sender<ReadRequest>,
    info_tx: mpsc::Sender<oneshot::Sender<Vec<MeasurementTypeInfo>>>,
    stop_tx: mpsc::Sender<oneshot::Sender<()>>,
    pools: Arc<Pools>,
}

impl DiskStore {
    pub async fn start(pools: Arc<Pools>, config: DiskStoreConfig) -> Result<Arc<Self>> {
        let layout = FileLayout::new(&config.data_path).await?;
        let meta = DiskMeta::load(&config.data_path).await?;

        let (add_tx, add_rx) = mpsc::channel(*DISK_QUEUE_SIZE);
        let (read_tx, read_rx) = mpsc::channel(*DISK_QUEUE_SIZE);
        let (info_tx, info_rx) = mpsc::channel(*DISK_QUEUE_SIZE);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let worker = DiskStoreWorker {
            block: Block::default(),
            meta,
            layout,
            config,
            pools: pools.clone(),
        };
        tokio::spawn(worker.go(add_rx, read_rx, info_rx, stop_rx));

        Ok(Arc::new(Self {
            add_tx,
            read_tx,
            info_tx,
            stop_tx,
            pools,
        }))
    }

    /// Hand a measurement to the worker and wait until it has been consumed
    /// into the block (or dropped). The measurement is recycled into the
    /// pools afterwards.
    pub async fn add(&self, name: &str, measurement: Measurement) {
        let (done_tx, done_rx) = oneshot::channel();
        let request = AddRequest {
            name: name.to_owned(),
            measurement,
            done: done_tx,
        };
        if self.add_tx.send(request).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    pub async fn measurements_in_time_range(
        &self,
        start: i64,
        end: i64,
        definition: &FilterDefinition,
    ) -> HashMap<String, Vec<Measurement>> {
        let (result_tx, result_rx) = oneshot::channel();
        let request = ReadRequest {
            start,
            end,
            definition: definition.clone(),
            result: result_tx,
        };
        if self.read_tx.send(request).await.is_err() {
            return HashMap::new();
        }
        result_rx.await.unwrap_or_default()
    }

    pub async fn stored_meta_info(&self) -> Vec<MeasurementTypeInfo> {
        let (result_tx, result_rx) = oneshot::channel();
        if self.info_tx.send(result_tx).await.is_err() {
            return Vec::new();
        }
        result_rx.await.unwrap_or_default()
    }

    /// Commit once and stop the worker. Requests queued behind the stop
    /// message are dropped.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.stop_tx.send(done_tx).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

#[async_trait]
impl Subscriber for DiskStore {
    async fn notify(&self, name: &str, measurement: &Measurement) {
        let copy = measurement.copy_from(&self.pools);
        self.add(name, copy).await;
    }
}

struct DiskStoreWorker {
    block: Block,
    meta: DiskMeta,
    layout: FileLayout,
    config: DiskStoreConfig,
    pools: Arc<Pools>,
}

impl DiskStoreWorker {
    async fn go(
        mut self,
        mut add_rx: mpsc::Receiver<AddRequest>,
        mut read_rx: mpsc::Receiver<ReadRequest>,
        mut info_rx: mpsc::Receiver<oneshot::Sender<Vec<MeasurementTypeInfo>>>,
        mut stop_rx: mpsc::Receiver<oneshot::Sender<()>>,
    ) {
        tracing::info!("Starting disk store worker for {:?}", self.layout.data_path());
        let mut flush = tokio::time::interval(self.config.flush_interval);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                stop = stop_rx.recv() => {
                    self.commit().await;
                    if let Some(done) = stop {
                        let _ = done.send(());
                    }
                    tracing::info!("Disk store worker stopped");
                    return;
                },
                _ = flush.tick() => self.commit().await,
                request = read_rx.recv() => match request {
                    Some(request) => {
                        let result = self
                            .handle_read(request.start, request.end, request.definition)
                            .await;
                        let _ = request.result.send(result);
                    },
                    None => break,
                },
                result = info_rx.recv() => match result {
                    Some(result) => {
                        let _ = result.send(self.meta.all_stored_infos());
                    },
                    None => break,
                },
                request = add_rx.recv() => match request {
                    Some(request) => {
                        self.handle_add(&request.name, &request.measurement).await;
                        let _ = request.done.send(());
                        self.pools.put_measurement(request.measurement);
                    },
                    None => break,
                },
            }
        }
        // All handles dropped without an explicit shutdown.
        self.commit().await;
    }

    async fn handle_add(&mut self, name: &str, measurement: &Measurement) {
        let id = match self
            .meta
            .get_or_create_id(name, measurement.measurement_type())
            .await
        {
            Ok(id) => id,
            Err(e) if e.is_type_mismatch() => {
                // The publisher is not authoritative on a name's schema.
                metrics::log_meta_type_mismatch();
                tracing::debug!("Dropping measurement: {e}");
                return;
            },
            Err(e) => {
                tracing::error!("Couldn't update the meta catalog for {name}: {e}");
                return;
            },
        };
        let line = match csv::construct_csv_line(id, measurement) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("Dropping unencodable measurement for {name}: {e}");
                return;
            },
        };
        self.block.add_bytes(measurement.timestamp(), &line);
        if self.block.len() > self.config.block_soft_cap {
            self.commit().await;
        }
    }

    /// Flush the block: append to the newest file until it reaches the
    /// rotate threshold, then start a new one; afterwards drop the oldest
    /// file if the directory crossed the disk budget. The block is reset
    /// unconditionally, an IO failure costs its measurements rather than
    /// unbounded memory.
    async fn commit(&mut self) {
        if self.block.is_empty() {
            return;
        }
        let timer = metrics::commit_timer();
        if let Err(e) = self.commit_inner().await {
            metrics::log_commit_error();
            tracing::error!("Couldn't commit block to disk: {e}");
        }
        self.block.reset();
        drop(timer);
    }

    async fn commit_inner(&mut self) -> Result<()> {
        let committed = self.block.len();
        let files = self.layout.sorted_file_list().await?;
        match files.last() {
            Some(newest) if newest.size < self.config.max_file_size => {
                self.layout.append_to_file(newest, &self.block).await?;
            },
            _ => self.layout.write_new_file(&self.block).await?,
        }
        metrics::log_commit_bytes(committed);

        let files = self.layout.sorted_file_list().await?;
        let mut total = file_layout::total_size(&files);
        if total > self.config.max_disk_size && files.len() > 1 {
            let oldest = &files[0];
            self.layout.remove_file(oldest).await?;
            total -= oldest.size;
            metrics::log_file_evicted();
            tracing::info!(
                "Removed oldest block file {} to stay under the disk budget",
                oldest.name,
            );
        }
        metrics::log_disk_size(total);
        Ok(())
    }

    async fn handle_read(
        &self,
        start: i64,
        end: i64,
        definition: FilterDefinition,
    ) -> HashMap<String, Vec<Measurement>> {
        let mut result = HashMap::new();
        if start > end {
            tracing::debug!("{}", Error::RangeInvalid { start, end });
            return result;
        }
        let files = match self.layout.files_in_time_range(start, end).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Couldn't list block files: {e}");
                return result;
            },
        };

        let mut filter = FilterCollection::new(definition);
        for file in files {
            let contents = match tokio::fs::read_to_string(self.layout.path_for(&file.name)).await
            {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!("Couldn't read block file {}: {e}", file.name);
                    continue;
                },
            };
            for line in contents.lines() {
                let Some((id, ts, value)) = csv::parse_csv_line(line) else {
                    metrics::log_malformed_line();
                    continue;
                };
                if ts < start || ts > end {
                    continue;
                }
                let Some(name) = self.meta.name_for_id(id) else {
                    continue;
                };
                let Some(measurement_type) = self.meta.type_for_id(id) else {
                    continue;
                };
                let measurement = match measurement_type {
                    MeasurementType::Numerical => {
                        let Ok(value) = value.parse::<f64>() else {
                            metrics::log_malformed_line();
                            continue;
                        };
                        Measurement::numerical(ts, value)
                    },
                    MeasurementType::Categorical => Measurement::categorical(ts, value),
                };
                if filter.passes(name, &measurement) {
                    result
                        .entry(name.to_owned())
                        .or_insert_with(Vec::new)
                        .push(measurement);
                }
            }
        }
        result
    }
}
