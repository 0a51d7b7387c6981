use crate::domain::ports::ConfigProvider;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_required_field, validate_url, validate_xml_name, Validate,
};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FILE_SUFFIX: &str = ".xml";
pub const DEFAULT_RECORD_TAG: &str = "case-file";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/bulk";
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_DECODE_WORKERS: usize = 4;
pub const DEFAULT_TRANSFORM_WORKERS: usize = 8;
pub const DEFAULT_DELIVERY_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1000;
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Static configuration for one run. Built once from a [`ConfigProvider`]
/// and cloned into every stage.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub input_dir: PathBuf,
    pub file_suffix: String,
    pub record_tag: String,
    pub endpoint: String,
    pub credentials: Option<Credentials>,
    pub batch_size: usize,
    pub decode_workers: usize,
    pub transform_workers: usize,
    pub delivery_workers: usize,
    pub queue_capacity: usize,
    pub request_timeout: Duration,
    pub progress_interval: Duration,
    pub loud: bool,
    pub quiet: bool,
    pub fake: bool,
    pub monitor: bool,
    pub fail_on_empty: bool,
    pub failed_batch_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            record_tag: DEFAULT_RECORD_TAG.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: None,
            batch_size: DEFAULT_BATCH_SIZE,
            decode_workers: DEFAULT_DECODE_WORKERS,
            transform_workers: DEFAULT_TRANSFORM_WORKERS,
            delivery_workers: DEFAULT_DELIVERY_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            loud: false,
            quiet: false,
            fake: false,
            monitor: false,
            fail_on_empty: true,
            failed_batch_dir: None,
        }
    }
}

impl PipelineSettings {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            ..Self::default()
        }
    }

    /// 從任一配置來源（CLI / TOML）建立執行設定
    pub fn from_provider<C: ConfigProvider + ?Sized>(config: &C) -> Result<Self> {
        let credentials = match config.username() {
            Some(username) => {
                let password = config.password().map(str::to_string);
                let password = validate_required_field("password", &password)?;
                Some(Credentials {
                    username: username.to_string(),
                    password: password.clone(),
                })
            }
            None => None,
        };

        let settings = Self {
            input_dir: config.input_dir().to_path_buf(),
            file_suffix: config.file_suffix().to_string(),
            record_tag: config.record_tag().to_string(),
            endpoint: config.endpoint().to_string(),
            credentials,
            batch_size: config.batch_size(),
            decode_workers: config.decode_workers(),
            transform_workers: config.transform_workers(),
            delivery_workers: config.delivery_workers(),
            queue_capacity: config.queue_capacity(),
            request_timeout: config.request_timeout(),
            progress_interval: config.progress_interval(),
            loud: config.loud(),
            quiet: config.quiet(),
            fake: config.fake(),
            monitor: config.monitor(),
            fail_on_empty: config.fail_on_empty(),
            failed_batch_dir: config.failed_batch_dir().map(|p| p.to_path_buf()),
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl Validate for PipelineSettings {
    fn validate(&self) -> Result<()> {
        validate_path("input_dir", &self.input_dir.to_string_lossy())?;
        validate_non_empty_string("file_suffix", &self.file_suffix)?;
        validate_xml_name("record_tag", &self.record_tag)?;

        // fake 模式不連線，端點只需非空
        if self.fake {
            validate_non_empty_string("endpoint", &self.endpoint)?;
        } else {
            validate_url("endpoint", &self.endpoint)?;
        }

        if let Some(credentials) = &self.credentials {
            validate_non_empty_string("username", &credentials.username)?;
        }

        validate_positive_number("batch_size", self.batch_size, 1)?;
        validate_range("decode_workers", self.decode_workers, 1, 256)?;
        validate_range("transform_workers", self.transform_workers, 1, 1024)?;
        validate_range("delivery_workers", self.delivery_workers, 1, 256)?;
        validate_positive_number("queue_capacity", self.queue_capacity, 1)?;
        if self.progress_interval < MIN_PROGRESS_INTERVAL {
            return Err(EtlError::InvalidConfigValueError {
                field: "progress_interval_ms".to_string(),
                value: self.progress_interval.as_millis().to_string(),
                reason: format!(
                    "Value must be at least {}",
                    MIN_PROGRESS_INTERVAL.as_millis()
                ),
            });
        }

        if let Some(dir) = &self.failed_batch_dir {
            validate_path("failed_batch_dir", &dir.to_string_lossy())?;
        }
        Ok(())
    }
}
