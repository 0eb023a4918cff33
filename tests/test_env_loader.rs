//! Unit tests for environment variable configuration loading

use etl_trace_monitor::config::{ConfigBuilder, ConfigLoader};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Mutex;

// Environment variables are process-wide, so tests touching them run one at a time
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: [&str; 11] = [
    "ETLMON_OUTPUT_DIR",
    "ETLMON_RECEIVER_PORT",
    "ETLMON_RECEIVER_BIND_ADDRESS",
    "ETLMON_RECEIVER_ENABLED",
    "ETLMON_HEALTH_PORT",
    "ETLMON_MAX_FILE_SIZE_MB",
    "ETLMON_RETENTION_SECS",
    "ETLMON_NOTIFICATION_ENABLED",
    "ETLMON_NOTIFICATION_ENDPOINT_URL",
    "ETLMON_NOTIFICATION_API_KEY",
    "ETLMON_NOTIFICATION_RECIPIENTS",
];

fn set_var(key: &str, value: &str) {
    // SAFETY: guarded by ENV_MUTEX
    unsafe { std::env::set_var(key, value) }
}

fn clear_etlmon_env_vars() {
    for var in VARS {
        // SAFETY: guarded by ENV_MUTEX
        unsafe { std::env::remove_var(var) }
    }
}

#[test]
fn test_load_from_env_with_all_vars() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_etlmon_env_vars();

    set_var("ETLMON_OUTPUT_DIR", "/tmp/env_test");
    set_var("ETLMON_RECEIVER_PORT", "14317");
    set_var("ETLMON_RECEIVER_BIND_ADDRESS", "127.0.0.1");
    set_var("ETLMON_HEALTH_PORT", "18080");
    set_var("ETLMON_MAX_FILE_SIZE_MB", "20");
    set_var("ETLMON_RETENTION_SECS", "86400");
    set_var("ETLMON_NOTIFICATION_ENABLED", "true");
    set_var("ETLMON_NOTIFICATION_ENDPOINT_URL", "https://alerts.example.com/hook");
    set_var("ETLMON_NOTIFICATION_API_KEY", "k-123");
    set_var("ETLMON_NOTIFICATION_RECIPIENTS", "ops@example.com, data@example.com,");

    let config = ConfigLoader::from_env().unwrap();

    assert_eq!(config.storage.output_dir, PathBuf::from("/tmp/env_test"));
    assert_eq!(config.receiver.port, 14317);
    assert_eq!(config.receiver.bind_address, "127.0.0.1");
    assert_eq!(config.health_port, 18080);
    assert_eq!(config.storage.max_file_size_mb, 20);
    assert_eq!(config.storage.retention_secs, 86400);

    let notification = config.notification.unwrap();
    assert!(notification.enabled);
    assert_eq!(
        notification.endpoint_url.as_deref(),
        Some("https://alerts.example.com/hook")
    );
    assert_eq!(notification.api_key.unwrap().expose_secret(), "k-123");
    assert_eq!(
        notification.recipients,
        vec!["ops@example.com".to_string(), "data@example.com".to_string()]
    );

    clear_etlmon_env_vars();
}

#[test]
fn test_load_from_env_with_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_etlmon_env_vars();

    set_var("ETLMON_OUTPUT_DIR", "/tmp/env_defaults");

    let config = ConfigLoader::from_env().unwrap();

    assert_eq!(config.storage.output_dir, PathBuf::from("/tmp/env_defaults"));
    assert!(config.receiver.enabled);
    assert_eq!(config.receiver.port, 4317);
    assert_eq!(config.health_port, 8080);
    assert!(config.notification.is_none());

    clear_etlmon_env_vars();
}

#[test]
fn test_unparseable_values_keep_configured_value() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_etlmon_env_vars();

    set_var("ETLMON_RECEIVER_PORT", "not_a_port");
    set_var("ETLMON_MAX_FILE_SIZE_MB", "-5");

    let config = ConfigLoader::from_env().unwrap();

    assert_eq!(config.receiver.port, 4317);
    assert_eq!(config.storage.max_file_size_mb, 100);

    clear_etlmon_env_vars();
}

#[test]
fn test_env_overrides_provided_config() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_etlmon_env_vars();

    let provided = ConfigBuilder::new()
        .output_dir("/tmp/provided")
        .receiver_port(5000)
        .build()
        .unwrap();
    set_var("ETLMON_RECEIVER_PORT", "6000");

    let config = ConfigLoader::load(Some(provided)).unwrap();

    assert_eq!(config.receiver.port, 6000);
    assert_eq!(config.storage.output_dir, PathBuf::from("/tmp/provided"));

    clear_etlmon_env_vars();
}

#[test]
fn test_enabled_notification_from_env_is_validated() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_etlmon_env_vars();

    set_var("ETLMON_NOTIFICATION_ENABLED", "true");

    assert!(ConfigLoader::from_env().is_err());

    clear_etlmon_env_vars();
}
