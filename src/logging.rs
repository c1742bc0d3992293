//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` overrides the configured level.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. Call once, from `main`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()?,
    }

    Ok(())
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(anyhow!(
            "invalid logging.level '{}': expected trace, debug, info, warn, or error",
            other
        )),
    }
}
