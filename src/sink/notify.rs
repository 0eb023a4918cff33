//! Failure notifications
//!
//! Failed executions are rendered into an [`Alert`] and handed to a
//! [`FailureNotifier`]. Delivery problems are reported to the caller, which
//! logs them; they never affect storage of the batch.

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::FailureNotifier;
use crate::config::NotificationConfig;
use crate::error::SinkError;
use crate::extract::ExecutionRecord;
use crate::extract::record::UNKNOWN;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rendered failure alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub subject: String,
    pub body: String,
    /// One-line summary suitable for SMS or chat
    pub message: String,
}

impl Alert {
    /// Render an alert for a failed record
    ///
    /// Successful records and failures without an error message produce no
    /// alert.
    pub fn from_record(record: &ExecutionRecord) -> Option<Self> {
        if record.success {
            return None;
        }
        let error_message = record.error_message.as_deref().filter(|m| !m.is_empty())?;
        let error_type = record.error_type.as_deref().unwrap_or(UNKNOWN);

        let subject = format!(
            "[ETL failure] {} - {} - {}",
            record.platform_type, record.group_name, record.process_name
        );

        let body = format!(
            "ETL process execution failed.\n\
             \n\
             Host: {}\n\
             Platform: {}\n\
             Group: {}\n\
             Process: {}\n\
             Start time: {}\n\
             End time: {}\n\
             Duration: {:.2}s\n\
             \n\
             Error type: {}\n\
             Error message: {}\n",
            record.host_name,
            record.platform_type,
            record.group_name,
            record.process_name,
            record.start_time.format(TIME_FORMAT),
            record.end_time.format(TIME_FORMAT),
            record.duration_seconds,
            error_type,
            error_message,
        );

        let message = format!(
            "ETL failure: {}-{}-{} / {}",
            record.platform_type, record.group_name, record.process_name, error_type
        );

        Some(Self {
            subject,
            body,
            message,
        })
    }
}

#[derive(Serialize)]
struct AlertPayload<'a> {
    recipients: &'a [String],
    subject: &'a str,
    body: &'a str,
    message: &'a str,
}

/// Posts alerts as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint_url: String,
    api_key: Option<SecretString>,
    recipients: Vec<String>,
}

impl WebhookNotifier {
    /// Create a notifier from validated notification settings
    pub fn new(config: &NotificationConfig) -> Result<Self, SinkError> {
        let endpoint_url = config.endpoint_url.clone().ok_or_else(|| {
            SinkError::Notification("Webhook notifier requires an endpoint_url".to_string())
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::Notification(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            endpoint_url = %endpoint_url,
            recipients = config.recipients.len(),
            timeout_secs = config.timeout_secs,
            "Initializing webhook failure notifier"
        );

        Ok(Self {
            client,
            endpoint_url,
            api_key: config.api_key.clone(),
            recipients: config.recipients.clone(),
        })
    }

    async fn post(&self, alert: Alert) -> Result<(), SinkError> {
        let payload = AlertPayload {
            recipients: &self.recipients,
            subject: &alert.subject,
            body: &alert.body,
            message: &alert.message,
        };

        let mut request = self.client.post(&self.endpoint_url).json(&payload);
        if let Some(ref key) = self.api_key {
            request = request.header("X-API-Key", key.expose_secret().as_str());
        }

        let response = request.send().await.map_err(|e| {
            warn!(endpoint_url = %self.endpoint_url, error = %e, "Failed to send failure alert");
            SinkError::Notification(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                endpoint_url = %self.endpoint_url,
                status = %status,
                "Failure alert rejected by endpoint"
            );
            return Err(SinkError::Notification(format!(
                "Endpoint responded with {}",
                status
            )));
        }

        debug!(subject = %alert.subject, "Delivered failure alert");
        Ok(())
    }
}

impl FailureNotifier for WebhookNotifier {
    fn send(&self, alert: Alert) -> BoxFuture<'_, Result<(), SinkError>> {
        self.post(alert).boxed()
    }
}

/// Writes alerts to the log instead of delivering them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn send(&self, alert: Alert) -> BoxFuture<'_, Result<(), SinkError>> {
        error!(subject = %alert.subject, body = %alert.body, "ETL process failed");
        futures::future::ready(Ok(())).boxed()
    }
}
