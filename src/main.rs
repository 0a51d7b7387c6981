use casefile_loader::config::LogFormat;
use casefile_loader::utils::logger;
use casefile_loader::utils::validation::Validate;
use casefile_loader::{CliConfig, EtlEngine, EtlError, PipelineSettings, TomlConfig};
use clap::Parser;

fn load_settings(cli: &CliConfig) -> casefile_loader::Result<PipelineSettings> {
    let Some(path) = &cli.config else {
        return PipelineSettings::from_provider(cli);
    };

    tracing::info!("📁 Loading configuration from: {}", path.display());
    let config = TomlConfig::from_file(path)?;
    config.validate()?;
    let mut settings = PipelineSettings::from_provider(&config)?;

    // 命令列旗標可以覆蓋設定檔
    settings.fake |= cli.fake;
    settings.loud |= cli.loud;
    settings.quiet |= cli.quiet;
    settings.monitor |= cli.monitor;
    Ok(settings)
}

fn fail(e: &EtlError) -> ! {
    tracing::error!(
        "❌ Load failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    match cli.log_format {
        LogFormat::Text => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => fail(&e),
    };
    tracing::debug!("Settings: {:?}", settings);

    let engine = match EtlEngine::from_settings(settings) {
        Ok(engine) => engine,
        Err(e) => fail(&e),
    };

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupted, draining in-flight work");
            cancel.cancel();
        }
    });

    match engine.run().await {
        Ok(summary) => {
            summary.log();
            let c = &summary.counters;
            println!(
                "✅ {} records transformed ({} failed), {} of {} batches delivered ({} failed)",
                c.records_transformed,
                c.records_failed,
                c.batches_delivered,
                c.batches_sealed,
                c.batches_failed
            );
            if !summary.is_clean() {
                tracing::warn!("⚠️ Run finished with counted failures, see summary above");
            }
        }
        Err(e) => fail(&e),
    }
}
