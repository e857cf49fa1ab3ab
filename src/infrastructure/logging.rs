//! Structured logging setup.
//!
//! Builds a `tracing` subscriber from the logging config: env-filter
//! seeded from the configured level (overridable via `RUST_LOG`), json or
//! pretty formatting, optional non-blocking file appender.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::models::config::LoggingConfig;

/// Initialize the global subscriber. Returns the appender guard when a
/// log directory is given; dropping it flushes buffered output.
pub fn init(config: &LoggingConfig, log_dir: Option<&std::path::Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "noesis.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if config.format == "json" {
                fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .json()
                    .with_current_span(true)
                    .init();
            } else {
                fmt().with_env_filter(filter).with_writer(writer).init();
            }
            Ok(Some(guard))
        }
        None => {
            if config.format == "json" {
                fmt().with_env_filter(filter).json().with_current_span(true).init();
            } else {
                fmt().with_env_filter(filter).init();
            }
            Ok(None)
        }
    }
}
