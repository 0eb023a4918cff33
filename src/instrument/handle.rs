//! Caller-owned tracer setup

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider, SpanExporter};
use tracing::{debug, info};

use super::scope::{TaskContext, TaskScope};
use crate::error::InstrumentationError;
use crate::extract::record::{HOST_NAME_KEY, UNKNOWN};

const INSTRUMENTATION_SCOPE: &str = "etl_trace_monitor";

/// Settings for the producer-side tracer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationConfig {
    pub service_name: String,
    pub service_version: String,
    /// Reported as the `host.name` resource attribute
    pub host_name: String,
    /// Written as `etl.platform` on every task span; left unset when `None`
    pub platform: Option<String>,
    /// OTLP/gRPC collector endpoint
    pub endpoint: String,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: "etl_tracer".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            host_name: std::env::var("HOSTNAME").unwrap_or_else(|_| UNKNOWN.to_string()),
            platform: None,
            endpoint: "http://localhost:4317".to_string(),
        }
    }
}

impl InstrumentationConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn resource_attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.version", self.service_version.clone()),
            KeyValue::new(HOST_NAME_KEY, self.host_name.clone()),
        ]
    }
}

/// Tracer provider shared by the tasks of one process
///
/// Construct once at start-up and pass by reference to whatever starts
/// tasks. Nothing is registered globally.
///
/// # Example
///
/// ```no_run
/// use etl_trace_monitor::instrument::{InstrumentationConfig, TaskContext, TaskOutput, TelemetryHandle};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let handle = TelemetryHandle::new(
///     InstrumentationConfig::new("nightly_loader").with_platform("Airflow"),
/// )?;
///
/// {
///     let mut task = handle.start_task(TaskContext::new("daily_dag", "load_orders"));
///     task.record_output(&TaskOutput::Empty);
/// }
///
/// handle.shutdown()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TelemetryHandle {
    config: InstrumentationConfig,
    provider: SdkTracerProvider,
    tracer: SdkTracer,
}

impl TelemetryHandle {
    /// Export task spans to the configured OTLP/gRPC endpoint
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: InstrumentationConfig) -> Result<Self, InstrumentationError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.clone())
            .build()
            .map_err(|e| InstrumentationError::ExporterBuild(e.to_string()))?;

        let provider = SdkTracerProvider::builder()
            .with_resource(build_resource(&config))
            .with_batch_exporter(exporter)
            .build();

        info!(
            service_name = %config.service_name,
            endpoint = %config.endpoint,
            "Initialized ETL task tracer"
        );

        Ok(Self::from_provider(config, provider))
    }

    /// Export task spans through any SDK exporter, one span at a time
    pub fn with_exporter<E>(config: InstrumentationConfig, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        let provider = SdkTracerProvider::builder()
            .with_resource(build_resource(&config))
            .with_simple_exporter(exporter)
            .build();
        Self::from_provider(config, provider)
    }

    fn from_provider(config: InstrumentationConfig, provider: SdkTracerProvider) -> Self {
        let tracer = provider.tracer(INSTRUMENTATION_SCOPE);
        Self {
            config,
            provider,
            tracer,
        }
    }

    /// Open the span of one task
    pub fn start_task(&self, context: TaskContext) -> TaskScope {
        debug!(
            group_name = %context.group_name,
            process_name = %context.process_name,
            "Starting ETL task span"
        );
        TaskScope::start(self.tracer.clone(), self.config.platform.as_deref(), context)
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Resource attributes attached to every exported span
    pub fn resource_attributes(&self) -> Vec<KeyValue> {
        self.config.resource_attributes()
    }

    /// Export all finished spans now
    pub fn force_flush(&self) -> Result<(), InstrumentationError> {
        self.provider
            .force_flush()
            .map_err(|e| InstrumentationError::Shutdown(e.to_string()))
    }

    /// Flush and stop the exporter
    pub fn shutdown(&self) -> Result<(), InstrumentationError> {
        self.provider
            .shutdown()
            .map_err(|e| InstrumentationError::Shutdown(e.to_string()))
    }
}

fn build_resource(config: &InstrumentationConfig) -> Resource {
    Resource::builder()
        .with_attributes(config.resource_attributes())
        .build()
}
