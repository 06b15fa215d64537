//! Utilities for logging.

use std::str::FromStr;

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    /// Single line human readable output.
    #[default]
    Compact,
    /// Newline delimited json.
    Json,
    /// Multi-line output, useful when debugging locally.
    Pretty,
}

impl FromStr for LoggingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "compact" => LoggingMode::Compact,
            "json" => LoggingMode::Json,
            "pretty" => LoggingMode::Pretty,
            other => return Err(format!("Unknown logging mode: {other}")),
        })
    }
}

/// Build the env filter, falling back to `default_level` when `RUST_LOG` is
/// unset or invalid.
fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_lowercase()))
}

/// Configure the global subscriber.
///
/// Errors if a global subscriber was already set.
pub fn configure_global_logger(
    default_level: Level,
    mode: LoggingMode,
) -> Result<(), SetGlobalDefaultError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE);

    match mode {
        LoggingMode::Compact => {
            tracing::subscriber::set_global_default(builder.compact().finish())
        }
        LoggingMode::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LoggingMode::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish()),
    }
}

/// Install a debug level logger for tests.
///
/// Safe to call from every test, only the first call takes effect.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_test_writer()
        .try_init();
}
