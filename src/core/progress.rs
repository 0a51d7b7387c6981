//! Progress aggregation.
//!
//! Every stage reports through a [`StatusSender`]; a single task owns the
//! [`Counters`] and is the only place they are mutated. Rendering happens on a
//! timer inside the same task and is skipped entirely in quiet mode.

use crate::config::PipelineSettings;
use crate::domain::event::StatusEvent;
use crate::utils::monitor::SystemMonitor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Cloneable handle every stage uses to report status.
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusSender {
    pub fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: StatusEvent) {
        if let Err(e) = self.tx.send(event).await {
            tracing::trace!("Progress aggregator already stopped, dropping {:?}", e.0);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Counters {
    pub records_seen: u64,
    pub records_transformed: u64,
    pub records_failed: u64,
    pub records_delivered: u64,
    pub batches_sealed: u64,
    pub batches_delivered: u64,
    /// All failed batches, rejected ones included.
    pub batches_failed: u64,
    pub batches_rejected: u64,
    pub files_opened: u64,
    pub files_closed: u64,
    pub files_failed: u64,
    pub files_aborted: u64,
    pub open_files: BTreeSet<String>,
    pub failed_batch_ids: Vec<u64>,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    started: Instant,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub fn new() -> Self {
        Self {
            records_seen: 0,
            records_transformed: 0,
            records_failed: 0,
            records_delivered: 0,
            batches_sealed: 0,
            batches_delivered: 0,
            batches_failed: 0,
            batches_rejected: 0,
            files_opened: 0,
            files_closed: 0,
            files_failed: 0,
            files_aborted: 0,
            open_files: BTreeSet::new(),
            failed_batch_ids: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn apply(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::FileOpened { file } => {
                self.files_opened += 1;
                self.open_files.insert(file.clone());
            }
            StatusEvent::FileClosed { file, .. } => {
                self.files_closed += 1;
                self.open_files.remove(file);
            }
            StatusEvent::FileFailed { .. } => self.files_failed += 1,
            StatusEvent::FileAborted { file, .. } => {
                self.files_aborted += 1;
                self.open_files.remove(file);
            }
            StatusEvent::RecordSeen => self.records_seen += 1,
            StatusEvent::RecordTransformed => self.records_transformed += 1,
            StatusEvent::RecordFailed { .. } => self.records_failed += 1,
            StatusEvent::BatchSealed { .. } => self.batches_sealed += 1,
            StatusEvent::BatchDelivered { size, .. } => {
                self.batches_delivered += 1;
                self.records_delivered += *size as u64;
            }
            StatusEvent::BatchFailed {
                batch_id, failure, ..
            } => {
                self.batches_failed += 1;
                if failure.is_rejection() {
                    self.batches_rejected += 1;
                }
                self.failed_batch_ids.push(*batch_id);
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn records_per_second(&self) -> f64 {
        rate(self.records_transformed, self.elapsed())
    }

    pub fn batches_per_second(&self) -> f64 {
        rate(self.batches_delivered, self.elapsed())
    }

    /// Records still inside the pipeline (decoded but neither transformed nor failed).
    pub fn records_in_flight(&self) -> u64 {
        self.records_seen
            .saturating_sub(self.records_transformed + self.records_failed)
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

pub struct ProgressAggregator {
    counters: Counters,
    interval: Duration,
    quiet: bool,
    loud: bool,
    monitor: SystemMonitor,
}

impl ProgressAggregator {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            counters: Counters::new(),
            interval: settings.progress_interval,
            quiet: settings.quiet,
            loud: settings.loud,
            monitor: SystemMonitor::new(settings.monitor && !settings.quiet),
        }
    }

    /// Consume events until every [`StatusSender`] is dropped, then return the
    /// final counters.
    pub async fn run(mut self, mut events: mpsc::Receiver<StatusEvent>) -> Counters {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // 第一次 tick 立即返回，略過
        ticker.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.observe(event),
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.quiet {
                        self.render();
                    }
                }
            }
        }

        if !self.quiet {
            self.render();
        }
        self.counters
    }

    fn observe(&mut self, event: StatusEvent) {
        match &event {
            StatusEvent::FileOpened { file } if self.loud => {
                tracing::info!("📂 Opened {}", file);
            }
            StatusEvent::FileClosed { file, records } if self.loud => {
                tracing::info!("📁 Finished {} ({} records)", file, records);
            }
            StatusEvent::FileFailed { file, reason } => {
                tracing::warn!("⚠️ Skipped {}: {}", file, reason);
            }
            StatusEvent::FileAborted { file, reason } => {
                tracing::warn!("⚠️ Abandoned rest of {}: {}", file, reason);
            }
            StatusEvent::RecordFailed { file, reason } if self.loud => {
                tracing::warn!("Record in {} failed: {}", file, reason);
            }
            StatusEvent::BatchFailed {
                batch_id,
                size,
                failure,
            } => {
                tracing::warn!("❌ Batch {} ({} docs) not delivered: {}", batch_id, size, failure);
            }
            _ => {}
        }
        self.counters.apply(&event);
    }

    fn render(&mut self) {
        let c = &self.counters;
        tracing::info!(
            "📊 records seen={} transformed={} failed={} in-flight={} | batches sealed={} delivered={} failed={} | {:.1} docs/s {:.2} batches/s | {:?}",
            c.records_seen,
            c.records_transformed,
            c.records_failed,
            c.records_in_flight(),
            c.batches_sealed,
            c.batches_delivered,
            c.batches_failed,
            c.records_per_second(),
            c.batches_per_second(),
            c.elapsed(),
        );
        if !c.open_files.is_empty() {
            let open: Vec<&str> = c.open_files.iter().map(String::as_str).collect();
            tracing::info!("📂 Open files: {}", open.join(", "));
        }
        if let Some(stats) = self.monitor.sample() {
            tracing::info!(
                "🖥️ CPU: {:.1}%, Memory: {}MB, Peak: {}MB",
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb
            );
        }
    }
}
