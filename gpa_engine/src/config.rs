//! Engine configuration: parsing, validation, and loading.
//!
//! The configuration is a small TOML document:
//!
//! ```toml
//! database_url = "grades.db"
//!
//! [engine]
//! bonus_cap = 4.80
//! created_by = "score-recompute"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [dispatch]
//! queue_capacity = 64
//! ```
//!
//! Every section is optional and falls back to its defaults. Unknown keys are
//! rejected so that typos do not silently change behavior. `DATABASE_URL`
//! in the environment overrides `database_url` (see [`EngineConfig::apply_env`]).
//!
//! Entrypoints:
//! - Parse + validate from a TOML string: [`load_config_str`]
//! - Parse + validate from a file path: [`load_config_path`]

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;

/// Default upper bound for `gpa_bonus_point` and `cpa_bonus_point`.
pub const MAX_BONUS_CAP: f64 = 4.80;

/// Default producer tag written to `term_gpa.created_by`.
pub const DEFAULT_CREATED_BY: &str = "score-recompute";

/// Environment variable overriding [`EngineConfig::database_url`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Validation failures for a parsed configuration.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// The bonus cap must be a finite, positive number.
    #[error("engine.bonus_cap must be finite and positive, got {0}")]
    InvalidBonusCap(f64),
    /// The producer tag must not be blank.
    #[error("engine.created_by cannot be empty after trimming")]
    EmptyCreatedBy,
    /// The trigger queue needs room for at least one message.
    #[error("dispatch.queue_capacity must be at least 1")]
    ZeroQueueCapacity,
}

/// Values threaded through the aggregation and ranking functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Cap applied to `gpa + bonus` and `cpa + bonus`.
    pub bonus_cap: f64,
    /// Producer tag stored on term GPA records.
    pub created_by: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bonus_cap: MAX_BONUS_CAP,
            created_by: DEFAULT_CREATED_BY.to_string(),
        }
    }
}

/// Trigger queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Bounded channel capacity between submitters and the worker.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// SQLite database path or `sqlite:` URL.
    pub database_url: String,
    /// Aggregation settings.
    pub engine: EngineSettings,
    /// Logging setup.
    pub logging: LogConfig,
    /// Trigger queue setup.
    pub dispatch: DispatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "grades.db".to_string(),
            engine: EngineSettings::default(),
            logging: LogConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Trim string fields and check numeric bounds.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let cap = self.engine.bonus_cap;
        if !cap.is_finite() || cap <= 0.0 {
            return Err(ConfigError::InvalidBonusCap(cap));
        }
        self.engine.created_by = self.engine.created_by.trim().to_string();
        if self.engine.created_by.is_empty() {
            return Err(ConfigError::EmptyCreatedBy);
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }

    /// Let `DATABASE_URL` override the configured database.
    pub fn apply_env(&mut self) {
        if let Some(url) = shared_utils::env::get_env_var_opt(DATABASE_URL_ENV) {
            self.database_url = url;
        }
    }
}

/// Parse and validate a configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<EngineConfig> {
    let mut cfg: EngineConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

/// Read a configuration file from disk, parse, and validate it.
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}
