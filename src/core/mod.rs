pub mod batch;
pub mod decoder;
pub mod delivery;
pub mod discovery;
pub mod etl;
pub mod progress;
pub mod transform;

pub use crate::domain::event::{DeliveryFailure, StatusEvent};
pub use crate::domain::model::{Batch, CaseFile, TransformedCaseFile};
pub use crate::domain::ports::{BatchSink, ConfigProvider, RecordSchema};
pub use crate::utils::error::Result;
