//! Capture pipeline: decides whether an observed request/response pair is
//! recorded and writes it through the storage provider.

pub mod alert;
pub mod ids;

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::StorageResult;
use crate::record::{RequestRecord, RequestSnapshot, ResponseSnapshot, TimeWindow};
use crate::storage::{StatsSummary, StorageProvider};

pub use alert::{AlertNotifier, AlertOutcome, LogNotifier, NoopNotifier};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidGenerator};

/// Why a call to [`Monitor::log_request`] did or did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Disabled,
    Ignored,
    NotSampled,
    /// End time before start time; nothing sensible to store.
    InvalidTiming,
    Stored { id: String, slow: bool },
    /// The write failed and was swallowed.
    StoreFailed { id: String },
}

pub struct Monitor {
    config: MonitorConfig,
    storage: Arc<dyn StorageProvider>,
    ids: Arc<dyn IdGenerator>,
    notifier: Arc<dyn AlertNotifier>,
    rng: Mutex<StdRng>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, storage: Arc<dyn StorageProvider>) -> Self {
        info!(
            service = %config.service_name,
            enabled = config.enabled,
            sample_rate = config.sample_rate,
            slow_request_threshold_ms = config.slow_request_threshold_ms,
            "request monitor initialized"
        );
        Self {
            config,
            storage,
            ids: Arc::new(UuidGenerator),
            notifier: Arc::new(NoopNotifier),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Fix the sampling RNG so runs are reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// Record one observed exchange. Never fails: storage errors are logged
    /// and reported through the returned outcome only.
    pub async fn log_request(
        &self,
        request: RequestSnapshot,
        response: ResponseSnapshot,
        start_time: i64,
        end_time: i64,
    ) -> CaptureOutcome {
        if !self.config.enabled {
            return CaptureOutcome::Disabled;
        }
        if self.should_ignore(&request.url) {
            return CaptureOutcome::Ignored;
        }
        if !self.should_sample() {
            return CaptureOutcome::NotSampled;
        }
        if end_time < start_time {
            warn!(
                url = %request.url,
                start_time,
                end_time,
                "request ended before it started, not captured"
            );
            return CaptureOutcome::InvalidTiming;
        }

        let record = RequestRecord::new(
            self.ids.next_id(),
            request,
            response,
            start_time,
            end_time,
            self.config.service_name.clone(),
        );
        let id = record.id.clone();
        let slow = record.latency > self.config.slow_request_threshold_ms;

        // Only clone when the alert hook may need the record afterwards
        let alert_copy = (slow && self.config.alert_target().is_some()).then(|| record.clone());
        let (method, url, status, latency) = (
            record.request.method.clone(),
            record.request.url.clone(),
            record.response.status_code,
            record.latency,
        );

        let stored = match self.storage.store(record).await {
            Ok(()) => {
                info!(
                    request_id = %id,
                    %method,
                    %url,
                    status_code = status,
                    latency_ms = latency,
                    "logged request"
                );
                true
            }
            Err(e) => {
                error!(request_id = %id, %url, error = %e, "failed to store monitored request");
                false
            }
        };

        if slow {
            warn!(
                request_id = %id,
                %method,
                %url,
                latency_ms = latency,
                threshold_ms = self.config.slow_request_threshold_ms,
                "slow request detected"
            );
            if let Some(record) = alert_copy {
                match self.notifier.notify(&record).await {
                    AlertOutcome::Failed(reason) => {
                        warn!(request_id = %id, %reason, "slow request alert failed")
                    }
                    outcome => debug!(request_id = %id, ?outcome, "slow request alert handled"),
                }
            }
        }

        if stored {
            CaptureOutcome::Stored { id, slow }
        } else {
            CaptureOutcome::StoreFailed { id }
        }
    }

    /// Stats straight from the provider. Errors propagate to the caller.
    pub async fn get_request_stats(&self, window: TimeWindow) -> StorageResult<StatsSummary> {
        debug!(start = window.start, end = window.end, "fetching request stats");
        let stats = self.storage.get_stats(window).await?;
        debug!(total = stats.total_requests, "retrieved request stats");
        Ok(stats)
    }

    /// Case-sensitive raw prefix match.
    fn should_ignore(&self, url: &str) -> bool {
        self.config
            .ignore_paths
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }

    fn should_sample(&self) -> bool {
        let draw: f64 = self.rng.lock().gen();
        draw < self.config.sample_rate
    }
}
