//! Embedded monitor
//!
//! Wires the configured Arrow store, optional webhook notifier and the
//! periodic retention sweep into a ready-to-use [`ExecutionPipeline`].

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, interval};
use tracing::{info, warn};

use crate::api::pipeline::ExecutionPipeline;
use crate::config::Config;
use crate::error::MonitorError;
use crate::sink::{ArrowExecutionStore, FailureNotifier, WebhookNotifier};

/// Monitor instance for embedded usage
///
/// # Example
///
/// ```no_run
/// use etl_trace_monitor::{Config, EtlMonitor};
///
/// # async fn example() -> Result<(), etl_trace_monitor::MonitorError> {
/// let monitor = EtlMonitor::new(Config::default()).await?;
///
/// let outcome = monitor
///     .pipeline()
///     .process_json(r#"{"resourceSpans": []}"#)
///     .await?;
/// assert_eq!(outcome.extracted, 0);
///
/// monitor.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct EtlMonitor {
    config: Config,
    store: Arc<ArrowExecutionStore>,
    pipeline: ExecutionPipeline,
    cleanup_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl EtlMonitor {
    /// Create a monitor and start its background cleanup task
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn new(config: Config) -> Result<Self, MonitorError> {
        config.validate()?;

        let store = Arc::new(ArrowExecutionStore::new(&config.storage)?);
        let mut pipeline = ExecutionPipeline::new(store.clone());

        if let Some(ref notification) = config.notification
            && notification.enabled
        {
            let notifier: Arc<dyn FailureNotifier> = Arc::new(WebhookNotifier::new(notification)?);
            pipeline = pipeline.with_notifier(notifier);
        }

        let cleanup_store = store.clone();
        let retention_secs = config.storage.retention_secs;
        let cleanup_interval = Duration::from_secs(config.storage.cleanup_interval_secs);
        let handle = tokio::spawn(async move {
            let mut interval_timer = interval(cleanup_interval);
            loop {
                interval_timer.tick().await;
                if let Err(e) = cleanup_store.cleanup(retention_secs).await {
                    warn!("Failed to cleanup execution files: {}", e);
                }
            }
        });

        info!(
            output_dir = %store.output_dir().display(),
            notifications = config.notification.as_ref().is_some_and(|n| n.enabled),
            "ETL trace monitor initialized"
        );

        Ok(Self {
            config,
            store,
            pipeline,
            cleanup_handle: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// The pipeline feeding the configured store and notifier
    pub fn pipeline(&self) -> &ExecutionPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> Arc<ArrowExecutionStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<(), MonitorError> {
        self.store.flush().await?;
        Ok(())
    }

    /// Stop the cleanup task and finish the current execution file
    pub async fn shutdown(&self) -> Result<(), MonitorError> {
        if let Some(handle) = self.cleanup_handle.lock().await.take() {
            handle.abort();
        }

        self.store.close().await?;

        info!("ETL trace monitor shutdown complete");
        Ok(())
    }
}
