//! Structured logging setup
//!
//! Call `init_logging` once at startup. `RUST_LOG` overrides the configured
//! level, e.g. `RUST_LOG=cadence_sequencer=trace,cadence_idle=debug`.
//!
//! Field names used across the crates: `code`, `depth`, `capacity`, `task`,
//! `priority`, `token`.

use std::sync::OnceLock;

use cadence_core::{CadenceError, CadenceResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines on stderr
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn build_filter(level: &str) -> CadenceResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| CadenceError::Logging(format!("invalid log level {:?}: {}", level, e))),
    }
}

/// Install the global subscriber.
///
/// Fails with `CadenceError::Logging` on a second call or when another
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> CadenceResult<()> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Err(CadenceError::Logging("logging already initialized".into()));
    }

    let filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };
    installed.map_err(|e| CadenceError::Logging(e.to_string()))?;

    let _ = LOGGING_INITIALIZED.set(());
    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}
