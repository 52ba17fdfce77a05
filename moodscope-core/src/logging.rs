//! Logging for the moodscope binaries
//!
//! Both binaries reserve stdout for their report output, so tracing goes
//! to a daily-rotated file under `~/.local/state/moodscope/` instead. The
//! sweep runs unattended for months at a time; `max_files` caps how many
//! daily files accumulate.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking writer alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set. The returned guard
/// must live until the process exits or trailing log lines are lost.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("moodscope.log")
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| {
            Error::Config(format!(
                "cannot open log file in {}: {e}",
                log_dir.display()
            ))
        })?;
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}
