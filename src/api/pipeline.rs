//! Extraction pipeline
//!
//! Runs one trace export through extraction, storage and failure
//! notification. Each batch is independent: a malformed export is reported
//! and skipped without affecting later batches.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, MonitorError};
use crate::extract::{self, ExecutionRecord, TraceExport};
use crate::sink::{ExecutionStore, FailureNotifier, RecordId};

/// What happened to one trace export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records extracted from the export
    pub extracted: usize,
    /// Identifiers assigned by the store, in extraction order
    pub stored: Vec<RecordId>,
    /// Failure alerts delivered
    pub notified: usize,
    /// Failure alerts that could not be delivered
    pub notify_failures: usize,
}

/// Extract, store and alert
#[derive(Clone)]
pub struct ExecutionPipeline {
    store: Arc<dyn ExecutionStore>,
    notifier: Option<Arc<dyn FailureNotifier>>,
}

impl std::fmt::Debug for ExecutionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPipeline")
            .field("notifications", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl ExecutionPipeline {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    /// Alert on failed executions through `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn FailureNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Process an already-decoded trace export
    pub async fn process_export(&self, export: &TraceExport) -> Result<BatchOutcome, MonitorError> {
        let records = extract::extract_process_executions(export);
        self.process_records(records).await
    }

    /// Process a gRPC export request
    pub async fn process_request(
        &self,
        request: &ExportTraceServiceRequest,
    ) -> Result<BatchOutcome, MonitorError> {
        self.process_records(extract::extract_from_request(request))
            .await
    }

    /// Parse and process an OTLP/JSON trace export
    pub async fn process_json(&self, json: &str) -> Result<BatchOutcome, MonitorError> {
        let records = extract::extract_from_json(json).map_err(reject_batch)?;
        self.process_records(records).await
    }

    /// Decode and process a protobuf-encoded export request
    pub async fn process_protobuf(&self, body: &[u8]) -> Result<BatchOutcome, MonitorError> {
        let records = extract::extract_from_protobuf(body).map_err(reject_batch)?;
        self.process_records(records).await
    }

    async fn process_records(
        &self,
        records: Vec<ExecutionRecord>,
    ) -> Result<BatchOutcome, MonitorError> {
        let extracted = records.len();
        let mut outcome = BatchOutcome {
            extracted,
            ..Default::default()
        };

        if records.is_empty() {
            debug!("Trace export contained no process executions");
            return Ok(outcome);
        }

        let failed: Vec<ExecutionRecord> = records.iter().filter(|r| !r.success).cloned().collect();

        outcome.stored = self.store.save_batch(records).await.map_err(|e| {
            warn!(error = %e, records = extracted, "Failed to store execution records");
            e
        })?;

        if let Some(ref notifier) = self.notifier {
            for record in &failed {
                match notifier.notify_failure(record).await {
                    Ok(true) => outcome.notified += 1,
                    Ok(false) => debug!(
                        process_name = %record.process_name,
                        "Failed execution has no error message, skipping alert"
                    ),
                    Err(e) => {
                        warn!(
                            process_name = %record.process_name,
                            group_name = %record.group_name,
                            error = %e,
                            "Failed to deliver failure alert"
                        );
                        outcome.notify_failures += 1;
                    }
                }
            }
        }

        info!(
            extracted = outcome.extracted,
            stored = outcome.stored.len(),
            failed = failed.len(),
            notified = outcome.notified,
            notify_failures = outcome.notify_failures,
            "Processed trace export"
        );

        Ok(outcome)
    }
}

fn reject_batch(error: ExtractionError) -> MonitorError {
    warn!(error = %error, "Rejecting malformed trace export");
    MonitorError::Extraction(error)
}
