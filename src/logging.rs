/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{StorageError, StorageResult};

/// Logging settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for the `stowage` target when `RUST_LOG` is unset
    pub level: Level,

    /// Write JSON lines to this file instead of compact stdout output
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Level from a `-v` count: 0 = info, 1 = debug, 2+ = trace
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }
}

fn build_filter(level: Level) -> StorageResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("stowage={}", level)))
        .map_err(|e| StorageError::Configuration(format!("Failed to create log filter: {}", e)))
}

/// Initialize structured logging
pub fn init_logging(config: &LogConfig) -> StorageResult<()> {
    let env_filter = build_filter(config.level)?;

    if let Some(ref log_path) = config.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stdout_logging(env_filter);
    }

    Ok(())
}

fn init_stdout_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn init_file_logging(log_path: &PathBuf, env_filter: EnvFilter) -> StorageResult<()> {
    let file = File::create(log_path)
        .map_err(|e| StorageError::Configuration(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging for tests (idempotent)
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stowage=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}
