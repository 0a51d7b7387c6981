use crate::config::settings::*;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_path, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub source: SourceConfig,
    pub delivery: DeliveryConfig,
    pub workers: Option<WorkersConfig>,
    pub progress: Option<ProgressConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub folder: PathBuf,
    pub suffix: Option<String>,
    pub record_tag: Option<String>,
    pub allow_empty: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub batch_size: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub fake: Option<bool>,
    pub failed_batch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub decode: Option<usize>,
    pub transform: Option<usize>,
    pub delivery: Option<usize>,
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    pub interval_ms: Option<u64>,
    pub loud: Option<bool>,
    pub quiet: Option<bool>,
    pub monitor: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LOADER_PASSWORD})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    fn workers(&self) -> Option<&WorkersConfig> {
        self.workers.as_ref()
    }

    fn progress(&self) -> Option<&ProgressConfig> {
        self.progress.as_ref()
    }
}

impl ConfigProvider for TomlConfig {
    fn input_dir(&self) -> &Path {
        &self.source.folder
    }

    fn file_suffix(&self) -> &str {
        self.source.suffix.as_deref().unwrap_or(DEFAULT_FILE_SUFFIX)
    }

    fn record_tag(&self) -> &str {
        self.source.record_tag.as_deref().unwrap_or(DEFAULT_RECORD_TAG)
    }

    fn endpoint(&self) -> &str {
        &self.delivery.endpoint
    }

    fn username(&self) -> Option<&str> {
        self.delivery.username.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.delivery.password.as_deref()
    }

    fn batch_size(&self) -> usize {
        self.delivery.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    fn decode_workers(&self) -> usize {
        self.workers()
            .and_then(|w| w.decode)
            .unwrap_or(DEFAULT_DECODE_WORKERS)
    }

    fn transform_workers(&self) -> usize {
        self.workers()
            .and_then(|w| w.transform)
            .unwrap_or(DEFAULT_TRANSFORM_WORKERS)
    }

    fn delivery_workers(&self) -> usize {
        self.workers()
            .and_then(|w| w.delivery)
            .unwrap_or(DEFAULT_DELIVERY_WORKERS)
    }

    fn queue_capacity(&self) -> usize {
        self.workers()
            .and_then(|w| w.queue_capacity)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.delivery
                .timeout_seconds
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    fn progress_interval(&self) -> Duration {
        Duration::from_millis(
            self.progress()
                .and_then(|p| p.interval_ms)
                .unwrap_or(DEFAULT_PROGRESS_INTERVAL_MS),
        )
    }

    fn loud(&self) -> bool {
        self.progress().and_then(|p| p.loud).unwrap_or(false)
    }

    fn quiet(&self) -> bool {
        self.progress().and_then(|p| p.quiet).unwrap_or(false)
    }

    fn fake(&self) -> bool {
        self.delivery.fake.unwrap_or(false)
    }

    fn monitor(&self) -> bool {
        self.progress().and_then(|p| p.monitor).unwrap_or(false)
    }

    fn fail_on_empty(&self) -> bool {
        !self.source.allow_empty.unwrap_or(false)
    }

    fn failed_batch_dir(&self) -> Option<&Path> {
        self.delivery.failed_batch_dir.as_deref()
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_path("source.folder", &self.source.folder.to_string_lossy())?;
        if !self.fake() {
            validate_url("delivery.endpoint", &self.delivery.endpoint)?;
        }
        // 其餘欄位由 PipelineSettings 統一檢查
        PipelineSettings::from_provider(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[source]
folder = "/data/tm"
record_tag = "case-file"

[delivery]
endpoint = "https://search.example.com/casefiles/_bulk"
batch_size = 250

[workers]
decode = 2
transform = 16
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.input_dir(), Path::new("/data/tm"));
        assert_eq!(config.batch_size(), 250);
        assert_eq!(config.decode_workers(), 2);
        assert_eq!(config.transform_workers(), 16);
        assert_eq!(config.delivery_workers(), DEFAULT_DELIVERY_WORKERS);
        assert_eq!(config.file_suffix(), ".xml");
        assert!(config.fail_on_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TEST_LOADER_SECRET", "s3cret");

        let toml_content = r#"
[source]
folder = "/data/tm"

[delivery]
endpoint = "https://search.example.com/bulk"
username = "loader"
password = "${TEST_LOADER_SECRET}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.password(), Some("s3cret"));

        let settings = PipelineSettings::from_provider(&config).unwrap();
        assert_eq!(settings.credentials.unwrap().password, "s3cret");

        std::env::remove_var("TEST_LOADER_SECRET");
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[source]
folder = "/data/tm"

[delivery]
endpoint = "invalid-url"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[source]
folder = "./incoming"
allow_empty = true

[delivery]
endpoint = "http://localhost:8080/bulk"
fake = true

[progress]
quiet = true
interval_ms = 250
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert!(config.fake());
        assert!(config.quiet());
        assert!(!config.fail_on_empty());
        assert_eq!(config.progress_interval(), Duration::from_millis(250));
    }
}
