//! Configuration module
//!
//! Provides configuration management for the ETL trace monitor including
//! loading from YAML files, environment variables, and programmatic API.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{Config, ConfigBuilder, NotificationConfig, ReceiverConfig, StorageConfig};
