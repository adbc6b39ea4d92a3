use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default file name when the configured log path has none
const DEFAULT_LOG_FILE: &str = "mediation.log";

/// Build the filter from `RUST_LOG`, falling back to the configured level
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_str(&log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Initialize logging system based on configuration
///
/// Returns the appender guard when file output goes through the non-blocking
/// writer; it must be kept alive for the lifetime of the process.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = build_filter(config);

    let Some(log_file) = &config.file else {
        // Console logging only
        if config.json {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .json()
                .with_env_filter(env_filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {}", e))?;
        } else {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_env_filter(env_filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {}", e))?;
        }
        return Ok(None);
    };

    let (writer, guard) = if config.rotation {
        let path = Path::new(log_file);
        let file_appender = tracing_appender::rolling::daily(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_LOG_FILE),
        );
        tracing_appender::non_blocking(file_appender)
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("Failed to open log file: {}", log_file))?;
        tracing_appender::non_blocking(file)
    };

    // Console output stays human readable even when the file is JSON
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_filter(build_filter(config));

    let file_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .json()
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {}", e))?;

    Ok(Some(guard))
}
