pub mod settings;
pub mod toml_config;

pub use settings::{Credentials, PipelineSettings};

#[cfg(feature = "cli")]
mod cli_args {
    use super::settings::*;
    use crate::domain::ports::ConfigProvider;
    use clap::{Parser, ValueEnum};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
    pub enum LogFormat {
        Text,
        Json,
    }

    #[derive(Debug, Clone, Parser)]
    #[command(name = "casefile-loader")]
    #[command(about = "Stream case-file XML documents into a bulk JSON ingestion endpoint")]
    pub struct CliConfig {
        /// Load settings from a TOML file instead of the flags below
        #[arg(long)]
        pub config: Option<PathBuf>,

        /// Directory holding the XML input files
        #[arg(long, default_value = ".")]
        pub folder: PathBuf,

        #[arg(long, default_value = DEFAULT_FILE_SUFFIX)]
        pub suffix: String,

        /// Element name that delimits one record
        #[arg(long, default_value = DEFAULT_RECORD_TAG)]
        pub record_tag: String,

        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        pub endpoint: String,

        #[arg(long, env = "LOADER_USERNAME")]
        pub username: Option<String>,

        #[arg(long, env = "LOADER_PASSWORD", hide_env_values = true)]
        pub password: Option<String>,

        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        pub batch_size: usize,

        #[arg(long, default_value_t = DEFAULT_DECODE_WORKERS)]
        pub decode_workers: usize,

        #[arg(long, default_value_t = DEFAULT_TRANSFORM_WORKERS)]
        pub transform_workers: usize,

        #[arg(long, default_value_t = DEFAULT_DELIVERY_WORKERS)]
        pub delivery_workers: usize,

        #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
        pub queue_capacity: usize,

        #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
        pub timeout_secs: u64,

        #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL_MS)]
        pub progress_interval_ms: u64,

        /// Log every opened file and every failure as it happens
        #[arg(long)]
        pub loud: bool,

        /// Count but never render progress
        #[arg(long)]
        pub quiet: bool,

        /// Dry run: batch and count but skip the HTTP calls
        #[arg(long)]
        pub fake: bool,

        /// Include process CPU / memory in the progress output
        #[arg(long)]
        pub monitor: bool,

        /// Finish successfully when the folder holds no input files
        #[arg(long)]
        pub allow_empty: bool,

        /// Write the body of every failed batch here for replay
        #[arg(long)]
        pub failed_batch_dir: Option<PathBuf>,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, value_enum, default_value = "text")]
        pub log_format: LogFormat,
    }

    impl ConfigProvider for CliConfig {
        fn input_dir(&self) -> &Path {
            &self.folder
        }

        fn file_suffix(&self) -> &str {
            &self.suffix
        }

        fn record_tag(&self) -> &str {
            &self.record_tag
        }

        fn endpoint(&self) -> &str {
            &self.endpoint
        }

        fn username(&self) -> Option<&str> {
            self.username.as_deref()
        }

        fn password(&self) -> Option<&str> {
            self.password.as_deref()
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }

        fn decode_workers(&self) -> usize {
            self.decode_workers
        }

        fn transform_workers(&self) -> usize {
            self.transform_workers
        }

        fn delivery_workers(&self) -> usize {
            self.delivery_workers
        }

        fn queue_capacity(&self) -> usize {
            self.queue_capacity
        }

        fn request_timeout(&self) -> Duration {
            Duration::from_secs(self.timeout_secs)
        }

        fn progress_interval(&self) -> Duration {
            Duration::from_millis(self.progress_interval_ms)
        }

        fn loud(&self) -> bool {
            self.loud
        }

        fn quiet(&self) -> bool {
            self.quiet
        }

        fn fake(&self) -> bool {
            self.fake
        }

        fn monitor(&self) -> bool {
            self.monitor
        }

        fn fail_on_empty(&self) -> bool {
            !self.allow_empty
        }

        fn failed_batch_dir(&self) -> Option<&Path> {
            self.failed_batch_dir.as_deref()
        }
    }

}

#[cfg(feature = "cli")]
pub use cli_args::{CliConfig, LogFormat};
