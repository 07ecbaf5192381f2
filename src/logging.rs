//! Logging setup for the application binary
//!
//! Console output always; a daily rolling file when a log directory is
//! configured. `RUST_LOG` overrides the default `callcheck=info` filter.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "callcheck=info";

/// Log file name prefix inside the log directory
pub const LOG_FILE_PREFIX: &str = "callcheck.log";

/// Filter from `RUST_LOG`, or `default` when unset or invalid
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init(default_filter: &str, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    if let Some(dir) = log_dir {
        tracing::info!(dir = %dir.display(), "File logging enabled");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        let filter = EnvFilter::new(DEFAULT_FILTER);
        assert_eq!(filter.to_string(), DEFAULT_FILTER);
    }
}
