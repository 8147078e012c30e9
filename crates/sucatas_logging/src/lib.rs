//! Shared logging utilities for Ache Sucatas binaries.
//!
//! One daily-rolling file layer plus a console layer on stderr. Console
//! verbosity follows `-v`; the file always gets the full default filter so
//! post-mortems do not depend on how the run was launched.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "sucatas=info,sucatas_http=info,sucatas_db=info,sucatas_extract=info,sucatas_validate=info";

/// Logging configuration for a binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Guard that must stay alive for the duration of the process; dropping it
/// flushes the non-blocking file writer.
pub type LogGuard = tracing_appender::non_blocking::WorkerGuard;

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let file_appender =
        tracing_appender::rolling::daily(log_dir, format!("{}.log", config.app_name));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(guard)
}

/// Get the Ache Sucatas home directory: `~/.ache_sucatas`.
pub fn sucatas_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("ACHE_SUCATAS_HOME") {
        return PathBuf::from(override_path);
    }
    home_dir().join(".ache_sucatas")
}

/// Get the logs directory: `~/.ache_sucatas/logs`.
pub fn logs_dir() -> PathBuf {
    sucatas_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_override_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("ACHE_SUCATAS_HOME", dir.path());
        assert_eq!(sucatas_home(), dir.path());
        assert!(logs_dir().starts_with(dir.path()));
        std::env::remove_var("ACHE_SUCATAS_HOME");
    }
}
