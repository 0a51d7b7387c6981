use crate::domain::model::Batch;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

pub trait ConfigProvider: Send + Sync {
    fn input_dir(&self) -> &Path;
    fn file_suffix(&self) -> &str;
    fn record_tag(&self) -> &str;
    fn endpoint(&self) -> &str;
    fn username(&self) -> Option<&str>;
    fn password(&self) -> Option<&str>;
    fn batch_size(&self) -> usize;
    fn decode_workers(&self) -> usize;
    fn transform_workers(&self) -> usize;
    fn delivery_workers(&self) -> usize;
    fn queue_capacity(&self) -> usize;
    fn request_timeout(&self) -> Duration;
    fn progress_interval(&self) -> Duration;
    fn loud(&self) -> bool;
    fn quiet(&self) -> bool;
    fn fake(&self) -> bool;
    fn monitor(&self) -> bool;
    fn fail_on_empty(&self) -> bool;
    fn failed_batch_dir(&self) -> Option<&Path>;
}

/// Decode/transform contract for one kind of record element.
///
/// `Raw` is deserialized from exactly one XML subtree; `transform` must be
/// pure and infallible. Serializing its output is the only way a record can
/// fail after decoding.
pub trait RecordSchema: Send + Sync + 'static {
    type Raw: DeserializeOwned + Send + 'static;
    type Transformed: Serialize;

    fn transform(&self, raw: Self::Raw) -> Self::Transformed;
}

#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn deliver(&self, batch: &Batch) -> Result<()>;
}
