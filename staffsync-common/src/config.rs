//! Configuration loading and config file resolution
//!
//! Bootstrap configuration comes from a single TOML file. The file path is
//! resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `STAFFSYNC_CONFIG` environment variable
//! 3. `<config dir>/staffsync/config.toml`
//! 4. Compiled defaults (no file)
//!
//! A missing file never stops startup; a malformed one does.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "STAFFSYNC_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub store: StoreConfig,
    pub status: StatusConfig,
    pub rules: RuleConfig,
    pub logging: LoggingConfig,
    pub events: EventsConfig,
}

/// Remote assignment store settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the assignment API, without trailing slash
    pub base_url: String,
    /// Per-request timeout, enforced by the HTTP client
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5780/api".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Status persistence settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusConfig {
    /// SQLite database holding persisted status entries
    pub database_path: PathBuf,
    /// Derived attribute the rule engine maintains
    pub attribute: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join("status.db"),
            attribute: "needs_action".to_string(),
        }
    }
}

/// Rule engine windows and thresholds
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuleConfig {
    /// Completed weeks before the current one
    pub actual_window_weeks: usize,
    /// Weeks starting next week
    pub forecast_window_weeks: usize,
    /// Minimum forecast points before a flag may be set
    pub min_forecast_points: usize,
    /// Forecast average at or below which the flag is set
    pub underutilization_threshold: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            actual_window_weeks: 4,
            forecast_window_weeks: 8,
            min_forecast_points: 3,
            underutilization_threshold: 25.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let rules = &self.rules;
        if rules.actual_window_weeks == 0 || rules.forecast_window_weeks == 0 {
            return Err(Error::Config("rule windows must be at least one week".into()));
        }
        if rules.min_forecast_points == 0 || rules.min_forecast_points > rules.forecast_window_weeks {
            return Err(Error::Config(format!(
                "min_forecast_points must be within 1..={}",
                rules.forecast_window_weeks
            )));
        }
        if !rules.underutilization_threshold.is_finite() || rules.underutilization_threshold < 0.0 {
            return Err(Error::Config(
                "underutilization_threshold must be a non-negative number".into(),
            ));
        }
        if self.store.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        if self.store.base_url.trim().is_empty() {
            return Err(Error::Config("store.base_url must not be empty".into()));
        }
        Ok(())
    }
}

/// Where a resolved config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    CommandLine,
    Environment,
    UserConfigDir,
}

/// Resolve the config file path by priority, without touching the file
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigOrigin)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), ConfigOrigin::CommandLine));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some((PathBuf::from(path), ConfigOrigin::Environment));
        }
    }

    // Priority 3: per-user config directory
    default_config_path().map(|p| (p, ConfigOrigin::UserConfigDir))
}

/// Load configuration following the resolution order
///
/// An explicit `--config` path must exist. Paths from the environment or
/// the user config directory fall back to defaults when absent.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some((path, ConfigOrigin::CommandLine)) => TomlConfig::load_file(&path),
        Some((path, origin)) => {
            if path.exists() {
                info!("Loading config from {} ({:?})", path.display(), origin);
                TomlConfig::load_file(&path)
            } else {
                if origin == ConfigOrigin::Environment {
                    warn!(
                        "{} points to missing file {}, using defaults",
                        CONFIG_ENV_VAR,
                        path.display()
                    );
                }
                Ok(TomlConfig::default())
            }
        }
        None => {
            warn!("No config directory available, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("staffsync").join("config.toml"))
}

/// Get OS-dependent default data folder path
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("staffsync"))
        .unwrap_or_else(|| PathBuf::from("./staffsync_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.rules.min_forecast_points, 3);
        assert_eq!(config.rules.underutilization_threshold, 25.0);
        assert_eq!(config.status.attribute, "needs_action");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [rules]
            underutilization_threshold = 30.0
            "#,
        )
        .unwrap();
        assert_eq!(config.rules.underutilization_threshold, 30.0);
        assert_eq!(config.rules.forecast_window_weeks, 8);
    }

    #[test]
    fn test_min_points_above_window_rejected() {
        let err = TomlConfig::from_toml_str(
            r#"
            [rules]
            forecast_window_weeks = 2
            min_forecast_points = 3
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[store\nbase_url = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_path_wins() {
        let (path, origin) = resolve_config_path(Some(Path::new("/tmp/x.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
        assert_eq!(origin, ConfigOrigin::CommandLine);
    }
}
