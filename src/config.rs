//! Configuration management for shell-execute.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Args;
use crate::execution::{Escalation, ExecutorConfig, DEFAULT_KILL_GRACE, DEFAULT_SHELL};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution settings.
    pub execution: ExecutionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Execution configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Shell that interprets command strings.
    pub shell: PathBuf,
    /// How to become another user.
    pub escalation: Escalation,
    /// Milliseconds between SIGTERM and SIGKILL on timeout.
    pub kill_grace_ms: u64,
    /// Time limit in seconds for requests without their own.
    pub default_timeout_secs: Option<f64>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            escalation: Escalation::default(),
            kill_grace_ms: DEFAULT_KILL_GRACE.as_millis() as u64,
            default_timeout_secs: None,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup (for testing).
    pub fn apply_env_from<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(shell) = var("SHELL_EXECUTE_SHELL") {
            if !shell.is_empty() {
                self.execution.shell = PathBuf::from(shell);
            }
        }

        if let Some(escalation) = var("SHELL_EXECUTE_ESCALATION") {
            self.execution.escalation = escalation
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SHELL_EXECUTE_ESCALATION", escalation))?;
        }

        if let Some(grace) = var("SHELL_EXECUTE_KILL_GRACE_MS") {
            self.execution.kill_grace_ms = grace
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SHELL_EXECUTE_KILL_GRACE_MS", grace))?;
        }

        if let Some(level) = var("SHELL_EXECUTE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref shell) = args.shell {
            self.execution.shell = shell.clone();
        }

        if let Some(escalation) = args.escalation {
            self.execution.escalation = escalation;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the settings used by [`crate::Executor`].
    pub fn executor_config(&self) -> Result<ExecutorConfig, ConfigError> {
        let default_timeout = match self.execution.default_timeout_secs {
            Some(secs) if secs > 0.0 => Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                ConfigError::InvalidValue("default_timeout_secs", secs.to_string())
            })?),
            Some(secs) => {
                return Err(ConfigError::InvalidValue(
                    "default_timeout_secs",
                    secs.to_string(),
                ))
            }
            None => None,
        };

        Ok(ExecutorConfig {
            shell: self.execution.shell.clone(),
            escalation: self.execution.escalation,
            kill_grace: Duration::from_millis(self.execution.kill_grace_ms),
            default_timeout,
        })
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    /// A setting had an unusable value.
    #[error("invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
}
