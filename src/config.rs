// Configuration File Support
//
// TOML configuration for the quota engine and the quotactl tool, with
// environment variable overrides. The path comes from --config, then
// QUOTA_CONFIG, then ./quota.toml.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::quota::{Scope, Target};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Quota configuration
    pub quota: QuotaConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Quota configuration
///
/// Limits are per (target, scope); negative means unlimited and zero means
/// the resource may not be created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    /// Whether quotas are enforced at all
    pub enabled: bool,

    /// Whether alerting is on; alert rule limits are 0 otherwise
    pub alerting_enabled: bool,

    /// Deadline for calls whose context has none (0 = no deadline)
    pub usage_timeout_secs: u64,

    pub global_user: i64,
    pub global_org: i64,

    /// Users per org
    pub org_user: i64,

    /// Orgs a user may create
    pub user_org: i64,

    pub global_dashboard: i64,
    pub org_dashboard: i64,
    pub global_data_source: i64,
    pub org_data_source: i64,
    pub global_api_key: i64,
    pub org_api_key: i64,
    pub global_session: i64,
    pub global_alert_rule: i64,
    pub org_alert_rule: i64,
    pub global_file: i64,

    /// Default limits for targets contributed by other subsystems,
    /// keyed by target name then scope name
    pub custom_targets: HashMap<String, HashMap<String, i64>>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            alerting_enabled: true,
            usage_timeout_secs: 30,
            global_user: -1,
            global_org: -1,
            org_user: 10,
            user_org: 10,
            global_dashboard: -1,
            org_dashboard: -1,
            global_data_source: -1,
            org_data_source: -1,
            global_api_key: -1,
            org_api_key: -1,
            global_session: -1,
            global_alert_rule: -1,
            org_alert_rule: 100,
            global_file: -1,
            custom_targets: HashMap::new(),
        }
    }
}

impl QuotaConfig {
    /// Default deadline for usage collection, if any
    pub fn usage_timeout(&self) -> Option<Duration> {
        (self.usage_timeout_secs > 0).then(|| Duration::from_secs(self.usage_timeout_secs))
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. If the file does not exist, defaults are used.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        let config = config.apply_env_overrides();

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Default configuration file path
    pub fn config_path() -> PathBuf {
        std::env::var("QUOTA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("quota.toml"))
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - QUOTA_LOG_LEVEL
    /// - QUOTA_LOG_FORMAT
    /// - QUOTA_ENABLED
    /// - QUOTA_USAGE_TIMEOUT_SECS
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("QUOTA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("QUOTA_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(enabled) = std::env::var("QUOTA_ENABLED") {
            self.quota.enabled = enabled.parse().unwrap_or(self.quota.enabled);
        }
        if let Ok(timeout) = std::env::var("QUOTA_USAGE_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.quota.usage_timeout_secs = timeout;
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        for (name, scopes) in &self.quota.custom_targets {
            let target = Target::new(name.as_str())
                .with_context(|| format!("Invalid custom quota target '{}'", name))?;
            if target.is_builtin() {
                anyhow::bail!("Custom quota target '{}' shadows a built-in target", name);
            }
            if scopes.is_empty() {
                anyhow::bail!("Custom quota target '{}' has no scopes", name);
            }
            for scope in scopes.keys() {
                scope.parse::<Scope>().with_context(|| {
                    format!("Custom quota target '{}' has unknown scope '{}'", name, scope)
                })?;
            }
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
