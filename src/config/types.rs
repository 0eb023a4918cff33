//! Configuration type definitions
//!
//! Defines all configuration structures for the ETL trace monitor.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// OTLP gRPC receiver settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiverConfig {
    /// Whether the gRPC trace receiver is started (default: true)
    #[serde(default = "default_receiver_enabled")]
    pub enabled: bool,

    /// Address to bind (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port for OTLP gRPC (default: 4317, standard OTLP port)
    #[serde(default = "default_receiver_port")]
    pub port: u16,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            enabled: default_receiver_enabled(),
            bind_address: default_bind_address(),
            port: default_receiver_port(),
        }
    }
}

/// Execution record storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory for Arrow IPC execution files (default: ./output_dir)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Rotate files above this size in MiB (default: 100)
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Delete files older than this many seconds (default: 604800, one week)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How often the retention sweep runs in seconds (default: 3600)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_file_size_mb: default_max_file_size_mb(),
            retention_secs: default_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path_str = self.output_dir.to_string_lossy();
        if path_str.is_empty() {
            return Err(ConfigError::InvalidOutputDir(
                "Output directory cannot be empty".to_string(),
            ));
        }

        // 4096 is safe for most platforms
        if path_str.len() > 4096 {
            return Err(ConfigError::InvalidOutputDir(format!(
                "Output directory path is too long ({} characters, max 4096)",
                path_str.len()
            )));
        }

        if path_str.contains('\0') {
            return Err(ConfigError::InvalidOutputDir(
                "Output directory path cannot contain null bytes".to_string(),
            ));
        }

        if self.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationFailed(
                "Maximum file size must be greater than 0".to_string(),
            ));
        }

        if self.retention_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Retention must be greater than 0 seconds".to_string(),
            ));
        }

        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Cleanup interval must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }
}

/// Failure notification settings
///
/// Alerts for failed executions are posted as JSON to `endpoint_url`.
///
/// # Example
///
/// ```no_run
/// use etl_trace_monitor::config::NotificationConfig;
///
/// let notification = NotificationConfig {
///     enabled: true,
///     endpoint_url: Some("https://alerts.example.com/hooks/etl".to_string()),
///     api_key: None,
///     recipients: vec!["ops@example.com".to_string()],
///     timeout_secs: 10,
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Whether failure notifications are sent (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Webhook URL (required if enabled)
    pub endpoint_url: Option<String>,

    /// Sent as `X-API-Key`; never serialized back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// Alert recipients (at least one if enabled)
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint_url: None,
            api_key: None,
            recipients: Vec::new(),
            timeout_secs: default_notification_timeout_secs(),
        }
    }
}

impl NotificationConfig {
    /// Validate notification configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        let Some(ref raw) = self.endpoint_url else {
            return Err(ConfigError::MissingRequiredField(
                "endpoint_url is required when notifications are enabled".to_string(),
            ));
        };

        let parsed = url::Url::parse(raw)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(
                "Notification endpoint must use http:// or https:// scheme".to_string(),
            ));
        }

        if self.recipients.iter().all(|r| r.trim().is_empty()) {
            return Err(ConfigError::MissingRequiredField(
                "at least one recipient is required when notifications are enabled".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Notification timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Main configuration structure for the ETL trace monitor
///
/// # Configuration Sources
///
/// - YAML files
/// - Environment variables (with `ETLMON_*` prefix)
/// - Programmatic API (using `ConfigBuilder`)
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = etl_trace_monitor::ConfigBuilder::new()
///     .output_dir("./executions")
///     .receiver_port(14317)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// OTLP gRPC receiver
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Plain HTTP health check port (default: 8080)
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Execution record storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional failure notifications
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            receiver: ReceiverConfig::default(),
            health_port: default_health_port(),
            storage: StorageConfig::default(),
            notification: None,
        }
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receiver.port == 0 {
            return Err(ConfigError::InvalidPort(
                "Receiver port must be between 1 and 65535".to_string(),
            ));
        }

        if self.health_port == 0 {
            return Err(ConfigError::InvalidPort(
                "Health check port must be between 1 and 65535".to_string(),
            ));
        }

        if self.receiver.enabled && self.receiver.port == self.health_port {
            return Err(ConfigError::InvalidPort(
                "Receiver and health check ports must be different".to_string(),
            ));
        }

        if self.receiver.bind_address.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Bind address cannot be empty".to_string(),
            ));
        }

        self.storage.validate()?;

        if let Some(ref notification) = self.notification {
            notification.validate()?;
        }

        Ok(())
    }
}

/// Builder for creating configurations programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage.output_dir = dir.into();
        self
    }

    /// Set file rotation size in MiB
    pub fn max_file_size_mb(mut self, size: u64) -> Self {
        self.config.storage.max_file_size_mb = size;
        self
    }

    /// Set file retention in seconds
    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.storage.retention_secs = secs;
        self
    }

    /// Enable or disable the gRPC receiver
    pub fn receiver_enabled(mut self, enabled: bool) -> Self {
        self.config.receiver.enabled = enabled;
        self
    }

    /// Set receiver port
    pub fn receiver_port(mut self, port: u16) -> Self {
        self.config.receiver.port = port;
        self
    }

    /// Set receiver bind address
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.receiver.bind_address = address.into();
        self
    }

    /// Set health check port
    pub fn health_port(mut self, port: u16) -> Self {
        self.config.health_port = port;
        self
    }

    /// Enable failure notifications
    pub fn notification(mut self, notification: NotificationConfig) -> Self {
        self.config.notification = Some(notification);
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Default value functions
fn default_receiver_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_receiver_port() -> u16 {
    4317
}

fn default_health_port() -> u16 {
    8080
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output_dir")
}

fn default_max_file_size_mb() -> u64 {
    100
}

fn default_retention_secs() -> u64 {
    7 * 24 * 3600
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_notification_timeout_secs() -> u64 {
    10
}
