//! Tracing subscriber setup for the `fire` binary and anything else that
//! embeds the engine. Driven by the `[logging]` section of [`EngineConfig`].
//!
//! [`EngineConfig`]: crate::config::EngineConfig

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;
use crate::error::{AssignmentError, Result};

fn span_events(cfg: &LogConfig) -> FmtSpan {
    if cfg.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Install the global subscriber. `RUST_LOG` directives are honored on top
/// of the configured level. Fails if a subscriber is already installed.
pub fn setup_logging(cfg: &LogConfig, app_name: &str) -> Result<()> {
    let level = parse_log_level(&cfg.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events(cfg))
        .with_file(cfg.file_info)
        .with_line_number(cfg.file_info);

    let installed = if cfg.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| AssignmentError::config(format!("Failed to install logger: {}", e)))?;

    tracing::debug!("Logging initialised for {} at {}", app_name, level);
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level)
        .map_err(|_| AssignmentError::config(format!("Invalid log level: {}", level)))
}
