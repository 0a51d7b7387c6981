pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::{toml_config::TomlConfig, PipelineSettings};
pub use core::{
    delivery::{FakeSink, HttpSink},
    etl::{EtlEngine, RunSummary},
    progress::Counters,
    transform::CaseFileSchema,
};
pub use utils::error::{EtlError, Result};
