use crate::core::progress::StatusSender;
use crate::domain::event::{DeliveryFailure, StatusEvent};
use crate::domain::model::Batch;
use tokio::sync::mpsc;

/// Groups payloads into batches of at most `max_size`.
///
/// End of input is explicit: the caller invokes [`BatchAccumulator::flush`]
/// once the payload queue is closed so the last partial batch is never lost.
#[derive(Debug)]
pub struct BatchAccumulator {
    max_size: usize,
    current: Vec<String>,
    next_id: u64,
}

impl BatchAccumulator {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            current: Vec::with_capacity(max_size),
            next_id: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.current.len()
    }

    /// Append one payload; returns the sealed batch when it fills up.
    pub fn push(&mut self, payload: String) -> Option<Batch> {
        self.current.push(payload);
        if self.current.len() >= self.max_size {
            Some(self.seal())
        } else {
            None
        }
    }

    /// Seal whatever is pending. `None` when nothing is pending.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.seal())
        }
    }

    fn seal(&mut self) -> Batch {
        let payloads = std::mem::replace(&mut self.current, Vec::with_capacity(self.max_size));
        let batch = Batch::seal(self.next_id, payloads);
        self.next_id += 1;
        batch
    }

    /// Single-writer loop. Returns the number of sealed batches once the
    /// payload queue is closed and the final partial batch was handed on.
    /// Dropping `batches` on return closes the delivery queue.
    pub async fn run(
        mut self,
        mut payloads: mpsc::Receiver<String>,
        batches: mpsc::Sender<Batch>,
        status: StatusSender,
    ) -> u64 {
        while let Some(payload) = payloads.recv().await {
            if let Some(batch) = self.push(payload) {
                hand_off(batch, &batches, &status).await;
            }
        }

        // 輸入結束，送出最後一批
        tracing::debug!("Payload queue closed with {} pending docs", self.pending());
        if let Some(batch) = self.flush() {
            hand_off(batch, &batches, &status).await;
        }
        self.next_id
    }
}

async fn hand_off(batch: Batch, batches: &mpsc::Sender<Batch>, status: &StatusSender) {
    let (batch_id, size) = (batch.id(), batch.len());
    status.emit(StatusEvent::BatchSealed { batch_id, size }).await;

    if batches.send(batch).await.is_err() {
        status
            .emit(StatusEvent::BatchFailed {
                batch_id,
                size,
                failure: DeliveryFailure::Transport("delivery pool unavailable".to_string()),
            })
            .await;
    }
}
