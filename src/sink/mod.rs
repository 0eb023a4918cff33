//! Downstream collaborators for extracted execution records
//!
//! The extraction engine only produces records; persisting them and alerting
//! on failures happens behind the two traits defined here so hosts can swap
//! in their own storage or delivery channel.

pub mod notify;
pub mod store;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use crate::error::SinkError;
use crate::extract::ExecutionRecord;

pub use notify::{Alert, LogNotifier, WebhookNotifier};
pub use store::{ArrowExecutionStore, RecordId};

/// Persists execution records
///
/// Implementations must assign one identifier per record, in input order.
pub trait ExecutionStore: Send + Sync {
    fn save_batch(
        &self,
        records: Vec<ExecutionRecord>,
    ) -> BoxFuture<'_, Result<Vec<RecordId>, SinkError>>;
}

/// Delivers alerts for failed executions
pub trait FailureNotifier: Send + Sync {
    /// Deliver an already-rendered alert
    fn send(&self, alert: Alert) -> BoxFuture<'_, Result<(), SinkError>>;

    /// Alert on a failed record
    ///
    /// Resolves to `false` when the record carries nothing worth alerting on
    /// (no error message), `true` once the alert was delivered.
    fn notify_failure(&self, record: &ExecutionRecord) -> BoxFuture<'_, Result<bool, SinkError>> {
        match Alert::from_record(record) {
            Some(alert) => {
                let delivery = self.send(alert);
                async move { delivery.await.map(|()| true) }.boxed()
            }
            None => future::ready(Ok(false)).boxed(),
        }
    }
}
