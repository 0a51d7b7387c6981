use std::fmt;

/// 各階段回報給進度彙總器的狀態事件
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    FileOpened { file: String },
    FileClosed { file: String, records: u64 },
    /// 檔案無法開啟，整個檔案被略過
    FileFailed { file: String, reason: String },
    /// 讀取途中 token stream 損毀，檔案剩餘部分被放棄
    FileAborted { file: String, reason: String },
    RecordSeen,
    RecordTransformed,
    RecordFailed { file: String, reason: String },
    BatchSealed { batch_id: u64, size: usize },
    BatchDelivered { batch_id: u64, size: usize },
    BatchFailed {
        batch_id: u64,
        size: usize,
        failure: DeliveryFailure,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryFailure {
    /// Connection refused, timeout, TLS and similar: nothing reached the endpoint.
    Transport(String),
    /// The endpoint answered with a non-success status.
    Rejected { status: u16 },
}

impl DeliveryFailure {
    pub fn is_rejection(&self) -> bool {
        matches!(self, DeliveryFailure::Rejected { .. })
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryFailure::Transport(reason) => write!(f, "transport error: {}", reason),
            DeliveryFailure::Rejected { status } => write!(f, "rejected with HTTP {}", status),
        }
    }
}
