//! Structured logging and tracing for Chargeflow
//!
//! This module installs the global tracing subscriber (console and optional
//! rolling file output) and provides component-scoped structured loggers.

use crate::config::LoggingConfig;
use crate::error::{ChargeflowError, Result};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod level;
mod structured;

pub use level::{level_rank, min_level, parse_log_level};
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

// Keep the non-blocking worker guard alive for the entire process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Environment variable that forces console-only output
pub const ENV_DISABLE_FILE_LOG: &str = "CHARGEFLOW_DISABLE_FILE_LOG";

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        if let Err(e) = install(config) {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(ChargeflowError::config(err.clone()));
    }
    Ok(())
}

fn install(config: &LoggingConfig) -> Result<()> {
    let base_level = parse_log_level(&config.level)?;
    let console_level = config
        .console_level
        .as_ref()
        .and_then(|s| parse_log_level(s).ok())
        .unwrap_or(base_level);
    let file_level = config
        .file_level
        .as_ref()
        .and_then(|s| parse_log_level(s).ok())
        .unwrap_or(base_level);

    let write_file = config.file_output && !should_use_console_only();

    // Most verbose level wins so layer-specific filters can down-filter
    let filter = build_env_filter(if write_file {
        min_level(console_level, file_level)
    } else {
        console_level
    });

    let console_layer = config.console_output.then(|| {
        let base = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false);
        if config.json_format {
            base.json()
                .with_filter(LevelFilter::from_level(console_level))
                .boxed()
        } else {
            base.with_filter(LevelFilter::from_level(console_level))
                .boxed()
        }
    });

    let file_layer = if write_file {
        let file_appender = rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix("chargeflow")
            .filename_suffix("log")
            .max_log_files(config.backup_count.max(1) as usize)
            .build(log_directory(&config.file))
            .map_err(|e| ChargeflowError::io(format!("Failed to create log file appender: {e}")))?;

        let (non_blocking_appender, guard) = non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        let base = fmt::layer()
            .with_writer(non_blocking_appender)
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false);
        Some(if config.json_format {
            base.json()
                .with_filter(LevelFilter::from_level(file_level))
                .boxed()
        } else {
            base.with_filter(LevelFilter::from_level(file_level))
                .boxed()
        })
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ChargeflowError::config(format!("Failed to install subscriber: {e}")))?;

    info!(
        "Logging initialized - console_level: {:?}, file_level: {:?}, file: {}",
        console_level,
        if write_file { Some(file_level) } else { None },
        config.file
    );
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chargeflow={level},reqwest=warn,hyper=warn").into())
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os(ENV_DISABLE_FILE_LOG).is_some()
}

// A path with an extension is a file; log into its parent directory
fn log_directory(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}
