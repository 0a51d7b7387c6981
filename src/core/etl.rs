//! Pipeline driver.
//!
//! ```text
//! discovery → decode pool → transform pool → accumulator → delivery pool
//!                 └────────────── status events ──────────────┘→ progress
//! ```
//!
//! Every arrow is a bounded queue. A stage is complete when its input queue
//! is closed and drained; it then drops its own sender, which closes the next
//! queue. The driver drops its sender clones right after spawning each pool,
//! so a queue can only close once every producer of that stage has finished.

use crate::config::PipelineSettings;
use crate::core::batch::BatchAccumulator;
use crate::core::decoder::{decode_worker, SourcedRecord, StreamDecoder};
use crate::core::delivery::{delivery_worker, sink_from_settings, FailedBatchArchive};
use crate::core::discovery::discover_files;
use crate::core::progress::{Counters, ProgressAggregator, StatusSender};
use crate::core::transform::{transform_worker, CaseFileSchema};
use crate::domain::model::Batch;
use crate::domain::ports::{BatchSink, RecordSchema};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::Validate;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Final state of a run that got past discovery.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub files_discovered: usize,
    pub cancelled: bool,
    pub counters: Counters,
}

impl RunSummary {
    /// True when nothing was skipped, failed or left undelivered.
    pub fn is_clean(&self) -> bool {
        let c = &self.counters;
        !self.cancelled
            && c.files_failed == 0
            && c.files_aborted == 0
            && c.records_failed == 0
            && c.batches_failed == 0
    }

    pub fn log(&self) {
        let c = &self.counters;
        tracing::info!(
            "📦 files: discovered={} opened={} failed={} aborted={}",
            self.files_discovered,
            c.files_opened,
            c.files_failed,
            c.files_aborted
        );
        tracing::info!(
            "📄 records: seen={} transformed={} failed={} delivered={}",
            c.records_seen,
            c.records_transformed,
            c.records_failed,
            c.records_delivered
        );
        tracing::info!(
            "🚚 batches: sealed={} delivered={} failed={} (rejected={})",
            c.batches_sealed,
            c.batches_delivered,
            c.batches_failed,
            c.batches_rejected
        );
        if !c.failed_batch_ids.is_empty() {
            tracing::warn!("❌ Failed batch ids: {:?}", c.failed_batch_ids);
        }
        tracing::info!(
            "⏱️ {:?} elapsed, {:.1} docs/s",
            c.elapsed(),
            c.records_per_second()
        );
    }
}

pub struct EtlEngine<S: RecordSchema> {
    settings: PipelineSettings,
    schema: Arc<S>,
    sink: Arc<dyn BatchSink>,
    cancel: CancellationToken,
}

impl EtlEngine<CaseFileSchema> {
    /// Case-file schema with the sink chosen by `settings.fake`.
    pub fn from_settings(settings: PipelineSettings) -> Result<Self> {
        let sink = sink_from_settings(&settings)?;
        Ok(Self::new(settings, CaseFileSchema, sink))
    }
}

impl<S: RecordSchema> EtlEngine<S> {
    pub fn new(settings: PipelineSettings, schema: S, sink: Arc<dyn BatchSink>) -> Self {
        Self {
            settings,
            schema: Arc::new(schema),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let settings = &self.settings;
        settings.validate()?;
        tracing::info!(
            "🚀 Loading '<{}>' records from {} into {}",
            settings.record_tag,
            settings.input_dir.display(),
            settings.endpoint
        );

        let files = discover_files(&settings.input_dir, &settings.file_suffix).await?;
        tracing::info!("🔎 Found {} input files", files.len());
        if files.is_empty() && settings.fail_on_empty {
            return Err(EtlError::NoInputFiles {
                path: settings.input_dir.clone(),
                suffix: settings.file_suffix.clone(),
            });
        }
        let files_discovered = files.len();

        let capacity = settings.queue_capacity;
        let (status_tx, status_rx) = mpsc::channel(capacity);
        let (file_tx, file_rx) = mpsc::channel::<PathBuf>(settings.decode_workers);
        let (record_tx, record_rx) = mpsc::channel::<SourcedRecord<S::Raw>>(capacity);
        let (payload_tx, payload_rx) = mpsc::channel::<String>(capacity);
        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(settings.delivery_workers);

        let status = StatusSender::new(status_tx);
        let aggregator = tokio::spawn(ProgressAggregator::new(settings).run(status_rx));

        let feeder = tokio::spawn(feed_files(files, file_tx, self.cancel.clone()));

        // decode pool
        let decoder = Arc::new(StreamDecoder::new(&settings.record_tag));
        let file_rx = Arc::new(Mutex::new(file_rx));
        let mut decoders = JoinSet::new();
        for worker_id in 0..settings.decode_workers {
            decoders.spawn(decode_worker(
                worker_id,
                decoder.clone(),
                file_rx.clone(),
                record_tx.clone(),
                status.clone(),
                self.cancel.clone(),
            ));
        }
        drop(record_tx);

        // transform pool
        let record_rx = Arc::new(Mutex::new(record_rx));
        let mut transformers = JoinSet::new();
        for worker_id in 0..settings.transform_workers {
            transformers.spawn(transform_worker(
                worker_id,
                self.schema.clone(),
                record_rx.clone(),
                payload_tx.clone(),
                status.clone(),
            ));
        }
        drop(payload_tx);

        let accumulator = tokio::spawn(BatchAccumulator::new(settings.batch_size).run(
            payload_rx,
            batch_tx,
            status.clone(),
        ));

        // delivery pool
        let archive = settings.failed_batch_dir.clone().map(FailedBatchArchive::new);
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let mut deliverers = JoinSet::new();
        for worker_id in 0..settings.delivery_workers {
            deliverers.spawn(delivery_worker(
                worker_id,
                self.sink.clone(),
                batch_rx.clone(),
                archive.clone(),
                status.clone(),
            ));
        }

        // 依管線順序等待；每個階段的工作都已在上面登記完畢
        join_task("discovery", feeder).await;
        join_pool("decode", &mut decoders).await;
        join_pool("transform", &mut transformers).await;
        if let Some(sealed) = join_task("accumulator", accumulator).await {
            tracing::debug!("Accumulator sealed {} batches", sealed);
        }
        join_pool("delivery", &mut deliverers).await;

        drop(status);
        let counters = aggregator.await.map_err(|e| EtlError::TaskFailed {
            stage: "progress".to_string(),
            message: e.to_string(),
        })?;

        let summary = RunSummary {
            files_discovered,
            cancelled: self.cancel.is_cancelled(),
            counters,
        };

        if files_discovered > 0 && summary.counters.files_opened == 0 && !summary.cancelled {
            return Err(EtlError::NoReadableFiles {
                discovered: files_discovered,
            });
        }
        Ok(summary)
    }
}

/// Queue discovered files for the decode pool; stops early on cancellation.
async fn feed_files(files: Vec<PathBuf>, tx: mpsc::Sender<PathBuf>, cancel: CancellationToken) {
    for path in files {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("🛑 Cancellation requested, no further files will be opened");
                break;
            }
            sent = tx.send(path) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn join_task<T>(stage: &str, handle: JoinHandle<T>) -> Option<T> {
    match handle.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("{} task ended abnormally: {}", stage, e);
            None
        }
    }
}

async fn join_pool(stage: &str, pool: &mut JoinSet<()>) {
    while let Some(result) = pool.join_next().await {
        if let Err(e) = result {
            tracing::error!("{} worker ended abnormally: {}", stage, e);
        }
    }
    tracing::debug!("{} stage drained", stage);
}
