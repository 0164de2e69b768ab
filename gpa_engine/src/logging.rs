//! Structured logging setup.
//!
//! Jobs, stores and the dispatcher emit `tracing` events with consistent
//! field names so that a failed run can be traced back to its trigger:
//! - `job_id`: identifier handed out by the dispatcher
//! - `term_id`, `program_id`, `school_id`, `grade_id`, `student_id`: filters
//! - `user_id`: the student a record belongs to
//!
//! Call [`init_logging`] once at startup. `RUST_LOG` overrides the configured
//! level, e.g. `RUST_LOG=gpa_engine=debug`.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output for interactive use.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Level filter (trace, debug, info, warn, error).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Error type for logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// [`init_logging`] was already called in this process.
    #[error("logging already initialized")]
    AlreadyInitialized,

    /// The configured level is not a valid filter directive.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    /// Another global subscriber was installed first.
    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(String),
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Err(LogError::AlreadyInitialized);
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.level),
    }
    .map_err(|_| LogError::InvalidLevel(config.level.clone()))?;

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.map_err(|e| LogError::SetSubscriber(e.to_string()))?;

    let _ = LOGGING_INITIALIZED.set(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_lowercase() {
        let cfg: LogConfig = toml::from_str("level = \"warn\"\nformat = \"json\"").unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "warn");
        assert!(toml::from_str::<LogConfig>("format = \"JSON\"").is_err());
    }
}
