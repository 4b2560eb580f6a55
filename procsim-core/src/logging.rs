//! Logging for procsim
//!
//! Events go to a daily-rotated `procsim.log` in the state directory
//! (`~/.local/state/procsim/`) or in `[logging] dir`. The CLI owns stdout and
//! stderr, so nothing is logged to the terminal. API keys are never logged.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// File name prefix of the rotated log files
pub const LOG_FILE_NAME: &str = "procsim.log";

/// Install the file logger.
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// must be held for the life of the process.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // A subscriber may already be installed when several commands share a
    // process (tests); keep the first one.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        version = env!("CARGO_PKG_VERSION"),
        "procsim logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Filter for a configured level name.
///
/// Accepts `off`, `error`, `warn`, `info`, `debug` and `trace`.
pub fn level_filter(level: &str) -> Result<EnvFilter> {
    let level: LevelFilter = level
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("unknown log level '{}'", level.trim())))?;
    Ok(EnvFilter::default().add_directive(level.into()))
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Path of the current log file (without the rotation date suffix)
pub fn log_file_path(config: &LoggingConfig) -> PathBuf {
    config.log_dir().join(LOG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_follows_dir_override() {
        let config = LoggingConfig {
            dir: Some(PathBuf::from("/tmp/procsim-logs")),
            ..Default::default()
        };
        assert_eq!(
            log_file_path(&config),
            PathBuf::from("/tmp/procsim-logs/procsim.log")
        );
        assert!(log_file_path(&LoggingConfig::default()).ends_with("procsim/procsim.log"));
    }

    #[test]
    fn test_level_filter() {
        assert!(level_filter("debug").is_ok());
        assert!(level_filter(" warn ").is_ok());
        assert!(level_filter("off").is_ok());
        assert!(matches!(level_filter("chatty"), Err(Error::Config(_))));
    }
}
