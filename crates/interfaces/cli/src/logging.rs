use anyhow::{Context, Result};
use hostagent_config::TelemetryConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.  `RUST_LOG` wins over the configured level.
///
/// With `log_dir` set, output goes to a daily rolling file and the returned
/// guard must be held until exit so buffered lines are flushed.
pub fn init(cfg: &TelemetryConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg.log_dir.trim().is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    }

    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("failed to create log directory {}", cfg.log_dir))?;
    let appender = tracing_appender::rolling::daily(&cfg.log_dir, "hostagent.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}
