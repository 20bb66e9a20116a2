//! Logging setup
//!
//! Console output goes to stderr (warnings only unless `--verbose`); a
//! daily-rolling file under `<data_dir>/logs` always gets debug detail.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "genesis.log";

/// Install the global subscriber
///
/// Keep the returned guard alive until exit, or buffered file lines are lost.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_filter = EnvFilter::from_default_env().add_directive(if verbose {
        "genesis=debug".parse()?
    } else {
        "genesis=warn".parse()?
    });
    let file_filter = EnvFilter::new("genesis=debug");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(file_filter),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}
