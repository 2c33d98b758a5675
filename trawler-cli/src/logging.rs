//! Logging initialization for the trawler CLI.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `TrawlerConfig`. Logs go to stderr so that `--output json` keeps stdout
//! machine-readable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use trawler_core::config::GeneralConfig;

use crate::error::CliError;

/// Initialize the global tracing subscriber.
///
/// Filter priority: `RUST_LOG`, then `--log-level`, then `general.log_level`.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Human-readable output
pub fn init_tracing(config: &GeneralConfig, level_override: Option<&str>) -> Result<(), CliError> {
    let level = level_override.unwrap_or(&config.log_level);
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| CliError::Config(format!("invalid log level '{level}': {e}")))?,
    };

    match config.log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| CliError::Config(format!("failed to initialize JSON logging: {e}"))),
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| CliError::Config(format!("failed to initialize logging: {e}"))),
        other => Err(CliError::Config(format!(
            "unknown log format '{other}', expected 'json' or 'pretty'"
        ))),
    }
}
