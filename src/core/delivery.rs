use crate::config::{Credentials, PipelineSettings};
use crate::core::progress::StatusSender;
use crate::domain::event::{DeliveryFailure, StatusEvent};
use crate::domain::model::Batch;
use crate::domain::ports::BatchSink;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const REJECTION_BODY_LIMIT: usize = 512;

/// POSTs each batch as `{"docs":[...]}` to the bulk endpoint.
pub struct HttpSink {
    client: Client,
    endpoint: String,
    credentials: Option<Credentials>,
}

impl HttpSink {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EtlError::ConfigError {
                message: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials,
        })
    }
}

#[async_trait]
impl BatchSink for HttpSink {
    async fn deliver(&self, batch: &Batch) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(batch.body());

        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        tracing::debug!("POST batch {} ({} docs) to {}", batch.id(), batch.len(), self.endpoint);
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        // 端點有回應但拒收，保留部分回應內容方便排查
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > REJECTION_BODY_LIMIT {
            let mut cut = REJECTION_BODY_LIMIT;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(EtlError::DeliveryRejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Dry-run sink: accepts every batch without touching the network.
#[derive(Debug, Default)]
pub struct FakeSink {
    delivered: AtomicU64,
}

impl FakeSink {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BatchSink for FakeSink {
    async fn deliver(&self, batch: &Batch) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Fake delivery of batch {} ({} docs)", batch.id(), batch.len());
        Ok(())
    }
}

pub fn sink_from_settings(settings: &PipelineSettings) -> Result<Arc<dyn BatchSink>> {
    if settings.fake {
        tracing::info!("🧪 Fake mode: batches will not be sent");
        return Ok(Arc::new(FakeSink::default()));
    }
    Ok(Arc::new(HttpSink::new(
        settings.endpoint.clone(),
        settings.credentials.clone(),
        settings.request_timeout,
    )?))
}

/// Keeps the request body of every failed batch so it can be replayed by hand.
#[derive(Debug, Clone)]
pub struct FailedBatchArchive {
    base_path: PathBuf,
}

impl FailedBatchArchive {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub async fn store(&self, batch: &Batch) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        let path = self.base_path.join(format!("batch-{:06}.json", batch.id()));
        tokio::fs::write(&path, batch.body()).await?;
        Ok(path)
    }
}

fn classify(err: &EtlError) -> DeliveryFailure {
    match err {
        EtlError::DeliveryRejected { status, .. } => DeliveryFailure::Rejected { status: *status },
        other => DeliveryFailure::Transport(other.to_string()),
    }
}

/// One delivery worker. Failed batches are counted, optionally archived and
/// never retried.
pub async fn delivery_worker(
    worker_id: usize,
    sink: Arc<dyn BatchSink>,
    batches: Arc<Mutex<mpsc::Receiver<Batch>>>,
    archive: Option<FailedBatchArchive>,
    status: StatusSender,
) {
    loop {
        let next = { batches.lock().await.recv().await };
        let Some(batch) = next else {
            break;
        };
        let (batch_id, size) = (batch.id(), batch.len());

        match sink.deliver(&batch).await {
            Ok(()) => {
                status
                    .emit(StatusEvent::BatchDelivered { batch_id, size })
                    .await;
            }
            Err(e) => {
                if let EtlError::DeliveryRejected { body, .. } = &e {
                    tracing::debug!(worker_id, batch_id, "Rejection body: {}", body);
                }
                if let Some(archive) = &archive {
                    match archive.store(&batch).await {
                        Ok(path) => tracing::info!("💾 Batch {} saved to {}", batch_id, path.display()),
                        Err(store_err) => {
                            tracing::error!("Cannot archive batch {}: {}", batch_id, store_err)
                        }
                    }
                }
                status
                    .emit(StatusEvent::BatchFailed {
                        batch_id,
                        size,
                        failure: classify(&e),
                    })
                    .await;
            }
        }
    }
    tracing::debug!(worker_id, "Delivery worker finished");
}
