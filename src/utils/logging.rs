use std::net::SocketAddr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LoggingConfig, MetricsConfig};
use crate::utils::error::{AppError, Result};

/// Default filter when `RUST_LOG` is unset: the configured level for this
/// crate, warnings for everything else.
pub fn default_directive(config: &LoggingConfig) -> String {
    format!("warn,dropwatch={}", config.level)
}

/// Install the global subscriber. The returned guard must be kept alive for
/// the lifetime of the process or buffered file output is lost.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config)))
        .map_err(|e| AppError::Validation(format!("Invalid log filter: {}", e)))?;

    let stdout_layer = fmt::layer().with_target(true);

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| AppError::Internal(format!("Failed to install subscriber: {}", e)))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .try_init()
                .map_err(|e| AppError::Internal(format!("Failed to install subscriber: {}", e)))?;
            Ok(None)
        }
    }
}

/// Expose the `metrics` counters over HTTP for Prometheus scraping.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Internal(format!("Failed to start metrics exporter: {}", e)))?;

    tracing::info!("Metrics exporter listening on {}", addr);
    Ok(())
}
