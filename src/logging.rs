//! tracing subscriber setup
//!
//! The configured `log_level` applies to this crate; dependencies stay at
//! `info` (`sqlx` at `warn`, it logs every statement). `RUST_LOG` replaces
//! the whole directive set.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Rotation named in config: `hourly`, `daily`, anything else never rotates.
fn rotation(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

fn filter_directives(level: &str) -> String {
    format!("info,account_ledger={},sqlx=warn", level)
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = RollingFileAppender::new(
        rotation(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    tracing::debug!(
        dir = %config.log_dir,
        file = %config.log_file,
        rotation = %config.rotation,
        json = config.use_json,
        "Logging initialized"
    );
    guard
}
