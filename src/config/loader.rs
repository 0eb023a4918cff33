//! Configuration loader
//!
//! Loads configuration from YAML files, environment variables, or programmatic API.
//! Priority: environment variables > provided config > defaults

use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::types::{Config, NotificationConfig};
use crate::error::ConfigError;
use tracing::{debug, info, warn};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from YAML file
    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        info!(
            config_path = %path.display(),
            "Loading configuration from YAML file"
        );

        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to read configuration file"
            );
            ConfigError::ValidationFailed(format!("Failed to read config file: {}", e))
        })?;

        let config = Self::from_yaml_str(&content)?;

        info!(
            config_path = %path.display(),
            output_dir = %config.storage.output_dir.display(),
            receiver_port = config.receiver.port,
            notifications_enabled = config.notification.as_ref().is_some_and(|n| n.enabled),
            "Configuration loaded and validated successfully"
        );

        Ok(config)
    }

    /// Parse YAML content, apply environment overrides and validate
    pub fn from_yaml_str(content: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(content).map_err(|e| {
            warn!(error = %e, "Failed to parse YAML configuration");
            ConfigError::ValidationFailed(format!("Failed to parse YAML: {}", e))
        })?;

        debug!(
            file_size_bytes = content.len(),
            "Parsed YAML configuration successfully"
        );

        Self::load(Some(config))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Config, ConfigError> {
        info!("Loading configuration from environment variables");
        Self::load(None)
    }

    /// Load configuration with priority: environment variables > provided config > defaults
    pub fn load(provided: Option<Config>) -> Result<Config, ConfigError> {
        let mut config = provided.unwrap_or_default();

        debug!(
            output_dir = %config.storage.output_dir.display(),
            receiver_port = config.receiver.port,
            "Starting configuration"
        );

        Self::apply_env_overrides(&mut config);

        config.validate().map_err(|e| {
            warn!(
                error = %e,
                "Configuration validation failed"
            );
            e
        })?;

        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(dir) = env::var("ETLMON_OUTPUT_DIR") {
            debug!(env_var = "ETLMON_OUTPUT_DIR", value = %dir, "Applying environment variable override");
            config.storage.output_dir = PathBuf::from(dir);
        }

        if let Some(port) = parse_env::<u16>("ETLMON_RECEIVER_PORT") {
            config.receiver.port = port;
        }

        if let Ok(address) = env::var("ETLMON_RECEIVER_BIND_ADDRESS") {
            config.receiver.bind_address = address;
        }

        if let Some(enabled) = parse_env::<bool>("ETLMON_RECEIVER_ENABLED") {
            config.receiver.enabled = enabled;
        }

        if let Some(port) = parse_env::<u16>("ETLMON_HEALTH_PORT") {
            config.health_port = port;
        }

        if let Some(size) = parse_env::<u64>("ETLMON_MAX_FILE_SIZE_MB") {
            config.storage.max_file_size_mb = size;
        }

        if let Some(secs) = parse_env::<u64>("ETLMON_RETENTION_SECS") {
            config.storage.retention_secs = secs;
        }

        // Notification settings only materialise when explicitly enabled
        if let Some(enabled) = parse_env::<bool>("ETLMON_NOTIFICATION_ENABLED") {
            let mut notification = config
                .notification
                .take()
                .unwrap_or_else(NotificationConfig::default);
            notification.enabled = enabled;
            config.notification = Some(notification);
        }

        if let Some(notification) = config.notification.as_mut() {
            if let Ok(url) = env::var("ETLMON_NOTIFICATION_ENDPOINT_URL") {
                notification.endpoint_url = Some(url);
            }

            if let Ok(key) = env::var("ETLMON_NOTIFICATION_API_KEY") {
                debug!(env_var = "ETLMON_NOTIFICATION_API_KEY", "Applying environment variable override");
                notification.api_key = Some(SecretString::new(key));
            }

            if let Ok(recipients) = env::var("ETLMON_NOTIFICATION_RECIPIENTS") {
                notification.recipients = recipients
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }
    }
}

fn parse_env<T>(name: &str) -> Option<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            debug!(env_var = name, value = ?value, "Applying environment variable override");
            Some(value)
        }
        Err(e) => {
            warn!(
                env_var = name,
                value = %raw,
                error = %e,
                "Failed to parse environment variable, keeping configured value"
            );
            None
        }
    }
}
