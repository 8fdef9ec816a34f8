//! Logging setup
//!
//! Library code only emits `tracing` events; binaries and tests pick a
//! subscriber here. `RUST_LOG` overrides the default filter.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "controller.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Human-readable logs on stderr
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// JSON logs in a daily-rolling file under `dir`
///
/// Keep the returned guard alive; dropping it flushes and stops the writer.
pub fn init_file_logging(dir: impl AsRef<Path>) -> Result<WorkerGuard> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer().json().with_writer(writer).with_ansi(false);
    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!("[Logging] Writing logs to {}", dir.display());
    Ok(guard)
}
