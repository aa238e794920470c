use std::path::PathBuf;

use chrono::Local;
use mozart_core::LoggingSection;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::{AppError, Result};

/// One file per run, named after the start time.
pub fn log_file_name() -> String {
    format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Installs the console layer (message only, INFO and up, on stderr) and the
/// persistent file layer. Keep the guard alive until the process exits or
/// buffered file lines are lost.
pub fn init(section: &LoggingSection) -> Result<(PathBuf, WorkerGuard)> {
    std::fs::create_dir_all(&section.dir)?;
    let file_name = log_file_name();
    let path = section.dir.join(&file_name);
    let appender = tracing_appender::rolling::never(&section.dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter = file_filter(&section.filter)?;
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false)
                .with_level(false)
                .with_filter(LevelFilter::INFO),
        )
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .try_init()
        .map_err(|err| AppError::Logging(err.to_string()))?;

    Ok((path, guard))
}

fn file_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .map_err(|err| AppError::Logging(format!("invalid filter {directive:?}: {err}")))
}
