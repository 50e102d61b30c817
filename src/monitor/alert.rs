use async_trait::async_trait;
use tracing::info;

use crate::record::RequestRecord;

/// What happened when a slow-request alert was handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    Delivered,
    Skipped,
    Failed(String),
}

/// Extension point for slow-request alerts. Real dispatch (webhooks,
/// chat, paging) lives outside this crate.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, record: &RequestRecord) -> AlertOutcome;
}

/// Default notifier: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl AlertNotifier for NoopNotifier {
    async fn notify(&self, _record: &RequestRecord) -> AlertOutcome {
        AlertOutcome::Skipped
    }
}

/// Writes the alert to the log instead of sending it anywhere.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    webhook: String,
}

impl LogNotifier {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
        }
    }
}

#[async_trait]
impl AlertNotifier for LogNotifier {
    async fn notify(&self, record: &RequestRecord) -> AlertOutcome {
        info!(
            request_id = %record.id,
            url = %record.request.url,
            latency_ms = record.latency,
            webhook = %self.webhook,
            "sending alert for slow request"
        );
        AlertOutcome::Delivered
    }
}
