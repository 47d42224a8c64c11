//! Configuration for shells embedding `dockside-core`.
//!
//! TOML file + `DOCKSIDE_*` environment loading via figment, translation
//! to `dockside_core::CoreConfig`, and [`logging`] setup. The core itself
//! never reads files or installs a subscriber.

pub mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dockside_core::{ConvergencePolicy, CoreConfig, CoreError, DEFAULT_PROGRAM};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Path of the container CLI.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Seconds between full refreshes. `0` turns the loop off.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub convergence: Convergence,

    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: default_program(),
            refresh_interval_secs: default_refresh_interval_secs(),
            convergence: Convergence::default(),
            logging: Logging::default(),
        }
    }
}

/// Polling after a start, stop, or remove.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Convergence {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Surface an error when a container never reaches its target status.
    #[serde(default)]
    pub warn_on_timeout: bool,
}

impl Default for Convergence {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            interval_ms: default_interval_ms(),
            warn_on_timeout: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Logging {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    /// Log to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from(DEFAULT_PROGRAM)
}
fn default_refresh_interval_secs() -> u64 {
    5
}
fn default_attempts() -> u32 {
    10
}
fn default_interval_ms() -> u64 {
    500
}
fn default_level() -> String {
    "dockside_core=info".into()
}

impl Config {
    /// Validate and convert into the engine's runtime configuration.
    pub fn to_core_config(&self) -> Result<CoreConfig, ConfigError> {
        if self.program.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                field: "program".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.convergence.attempts == 0 {
            return Err(ConfigError::Validation {
                field: "convergence.attempts".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(CoreConfig {
            program: self.program.clone(),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            convergence: ConvergencePolicy {
                attempts: self.convergence.attempts,
                interval: Duration::from_millis(self.convergence.interval_ms),
                warn_on_timeout: self.convergence.warn_on_timeout,
            },
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("app", "dockside", "dockside").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("dockside");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DOCKSIDE_").split("__"))
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from a specific file + environment. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

/// Load config, returning a default if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
