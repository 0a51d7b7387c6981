use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Cannot list input directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No input files ending in '{suffix}' found in {path}")]
    NoInputFiles { path: PathBuf, suffix: String },

    #[error("None of the {discovered} discovered input files could be opened")]
    NoReadableFiles { discovered: usize },

    #[error("Cannot open input file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record decode failed in {file}: {message}")]
    Decode { file: String, message: String },

    #[error("Delivery transport failure: {message}")]
    DeliveryTransport { message: String },

    #[error("Delivery rejected by endpoint with HTTP {status}")]
    DeliveryRejected { status: u16, body: String },

    #[error("Pipeline {stage} task failed: {message}")]
    TaskFailed { stage: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration for '{field}' (value: '{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },
}

impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> Self {
        EtlError::DeliveryTransport {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Record,
    Delivery,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::Discovery { .. }
            | EtlError::NoInputFiles { .. }
            | EtlError::NoReadableFiles { .. }
            | EtlError::FileOpen { .. } => ErrorCategory::Input,
            EtlError::Decode { .. } | EtlError::SerializationError(_) => ErrorCategory::Record,
            EtlError::DeliveryTransport { .. } | EtlError::DeliveryRejected { .. } => {
                ErrorCategory::Delivery
            }
            EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::IoError(_) | EtlError::TaskFailed { .. } => ErrorCategory::System,
        }
    }

    /// 決定錯誤的影響範圍：Low/Medium 只影響單筆記錄或批次，High 以上會中止整個流程
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::Decode { .. } | EtlError::SerializationError(_) => ErrorSeverity::Low,
            EtlError::FileOpen { .. }
            | EtlError::DeliveryTransport { .. }
            | EtlError::DeliveryRejected { .. } => ErrorSeverity::Medium,
            EtlError::Discovery { .. }
            | EtlError::NoInputFiles { .. }
            | EtlError::NoReadableFiles { .. }
            | EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorSeverity::High,
            EtlError::IoError(_) | EtlError::TaskFailed { .. } => ErrorSeverity::Critical,
        }
    }

    /// Process exit code for an error that ended the run.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::Discovery { .. } => "Check that the input directory exists and is readable",
            EtlError::NoInputFiles { .. } => {
                "Check the input directory and --suffix, or pass --allow-empty"
            }
            EtlError::NoReadableFiles { .. } => "Check file permissions in the input directory",
            EtlError::FileOpen { .. } => "Check the file permissions; the file was skipped",
            EtlError::Decode { .. } => "Inspect the record element in the source file",
            EtlError::DeliveryTransport { .. } => {
                "Check network connectivity and the endpoint URL; replay failed batches"
            }
            EtlError::DeliveryRejected { .. } => {
                "Check credentials and payload format; replay failed batches"
            }
            EtlError::SerializationError(_) => "Inspect the record that failed to serialize",
            EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::ConfigValidationError { .. } => {
                "Fix the configuration value and run again (see --help)"
            }
            EtlError::IoError(_) => "Check disk space and file permissions",
            EtlError::TaskFailed { .. } => "Run again with --verbose and report the log",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::Discovery { path, .. } => {
                format!("Input directory '{}' could not be read", path.display())
            }
            EtlError::NoInputFiles { path, suffix } => {
                format!("No '{}' files to load in '{}'", suffix, path.display())
            }
            EtlError::DeliveryRejected { status, .. } => {
                format!("The bulk endpoint rejected a batch (HTTP {})", status)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_exit_non_zero() {
        let err = EtlError::Discovery {
            path: PathBuf::from("/missing"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.category(), ErrorCategory::Input);
        assert!(err.severity() >= ErrorSeverity::High);
        assert_ne!(err.exit_code(), 0);

        let err = EtlError::NoReadableFiles { discovered: 3 };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_record_scoped_errors_are_low_severity() {
        let err = EtlError::Decode {
            file: "a.xml".to_string(),
            message: "invalid digit".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_rejection_is_distinguished_from_transport() {
        let rejected = EtlError::DeliveryRejected {
            status: 400,
            body: "bad doc".to_string(),
        };
        let transport = EtlError::DeliveryTransport {
            message: "connection refused".to_string(),
        };
        assert_eq!(rejected.category(), ErrorCategory::Delivery);
        assert_eq!(transport.category(), ErrorCategory::Delivery);
        assert!(rejected.user_friendly_message().contains("400"));
        assert_ne!(rejected.recovery_suggestion(), transport.recovery_suggestion());
    }
}
