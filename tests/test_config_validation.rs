//! Unit tests for configuration validation

use etl_trace_monitor::config::{ConfigBuilder, ConfigLoader, NotificationConfig};
use etl_trace_monitor::error::ConfigError;

fn notification(endpoint: Option<&str>, recipients: &[&str]) -> NotificationConfig {
    NotificationConfig {
        enabled: true,
        endpoint_url: endpoint.map(str::to_string),
        api_key: None,
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
        timeout_secs: 10,
    }
}

#[test]
fn test_valid_config_passes_validation() {
    let config = ConfigBuilder::new()
        .output_dir("/tmp/valid")
        .receiver_port(14317)
        .health_port(18080)
        .build()
        .unwrap();

    assert!(config.validate().is_ok());
    assert_eq!(config.storage.max_file_size_mb, 100);
    assert_eq!(config.storage.retention_secs, 604800);
    assert!(config.notification.is_none());
}

#[test]
fn test_empty_output_dir_fails_validation() {
    let config = ConfigBuilder::new().output_dir("").build();

    match config.unwrap_err() {
        ConfigError::InvalidOutputDir(_) => {}
        other => panic!("Expected InvalidOutputDir error, got {:?}", other),
    }
}

#[test]
fn test_output_dir_with_nul_fails_validation() {
    let config = ConfigBuilder::new().output_dir("/tmp/a\0b").build();
    assert!(matches!(config, Err(ConfigError::InvalidOutputDir(_))));
}

#[test]
fn test_zero_port_fails_validation() {
    let config = ConfigBuilder::new().receiver_port(0).build();
    assert!(matches!(config, Err(ConfigError::InvalidPort(_))));

    let config = ConfigBuilder::new().health_port(0).build();
    assert!(matches!(config, Err(ConfigError::InvalidPort(_))));
}

#[test]
fn test_port_conflict_fails_validation() {
    let config = ConfigBuilder::new()
        .receiver_port(9000)
        .health_port(9000)
        .build();
    assert!(matches!(config, Err(ConfigError::InvalidPort(_))));

    // No conflict when the receiver is not started
    let config = ConfigBuilder::new()
        .receiver_enabled(false)
        .receiver_port(9000)
        .health_port(9000)
        .build();
    assert!(config.is_ok());
}

#[test]
fn test_zero_sizes_fail_validation() {
    let config = ConfigBuilder::new().max_file_size_mb(0).build();
    assert!(matches!(config, Err(ConfigError::ValidationFailed(_))));

    let config = ConfigBuilder::new().retention_secs(0).build();
    assert!(matches!(config, Err(ConfigError::ValidationFailed(_))));
}

#[test]
fn test_enabled_notification_requires_endpoint() {
    let config = ConfigBuilder::new()
        .notification(notification(None, &["ops@example.com"]))
        .build();
    assert!(matches!(config, Err(ConfigError::MissingRequiredField(_))));
}

#[test]
fn test_notification_endpoint_must_be_http() {
    let config = ConfigBuilder::new()
        .notification(notification(Some("ftp://alerts.example.com"), &["ops"]))
        .build();
    assert!(matches!(config, Err(ConfigError::InvalidUrl(_))));

    let config = ConfigBuilder::new()
        .notification(notification(Some("not a url"), &["ops"]))
        .build();
    assert!(matches!(config, Err(ConfigError::InvalidUrl(_))));
}

#[test]
fn test_enabled_notification_requires_recipient() {
    let config = ConfigBuilder::new()
        .notification(notification(Some("https://alerts.example.com/hook"), &[]))
        .build();
    assert!(matches!(config, Err(ConfigError::MissingRequiredField(_))));
}

#[test]
fn test_disabled_notification_is_not_validated() {
    let mut disabled = notification(None, &[]);
    disabled.enabled = false;
    let config = ConfigBuilder::new().notification(disabled).build();
    assert!(config.is_ok());
}

#[test]
fn test_yaml_loading() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        r#"
receiver:
  port: 14317
health_port: 18080
storage:
  output_dir: /var/lib/etl-monitor
  max_file_size_mb: 50
notification:
  enabled: true
  endpoint_url: https://alerts.example.com/hook
  api_key: secret-key
  recipients:
    - ops@example.com
"#,
    )
    .unwrap();

    let config = ConfigLoader::from_yaml(&path).unwrap();

    assert_eq!(config.receiver.port, 14317);
    assert!(config.receiver.enabled);
    assert_eq!(config.health_port, 18080);
    assert_eq!(config.storage.max_file_size_mb, 50);
    assert_eq!(config.storage.cleanup_interval_secs, 3600);
    let notification = config.notification.unwrap();
    assert!(notification.api_key.is_some());
    assert_eq!(notification.timeout_secs, 10);
}

#[test]
fn test_invalid_yaml_is_rejected() {
    let result = ConfigLoader::from_yaml_str("receiver: [unclosed");
    assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
}
