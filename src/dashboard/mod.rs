//! Dashboard aggregation over a raw request log.

pub mod endpoints;
pub mod percentiles;
pub mod stream;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::record::{RequestRecord, TimeWindow};
use crate::storage::StorageProvider;

pub use endpoints::EndpointStats;
pub use percentiles::LatencyPercentiles;

// ─── Configuration ───────────────────────────────────────────────

/// Rows kept in each endpoint ranking
const ENDPOINT_LIMIT: usize = 5;

/// Width of one `requests_over_time` bucket
const BUCKET_MS: i64 = 3_600_000;

// ─── Public types ────────────────────────────────────────────────

/// One point on the request-volume chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    /// Bucket start (epoch ms, aligned to the hour).
    pub timestamp_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

/// Everything the dashboard renders for one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_requests: u64,
    pub average_latency: f64,
    /// Percentage (0–100) of requests with status ≥ 400.
    pub error_rate: f64,
    pub top_endpoints: Vec<EndpointStats>,
    pub slowest_endpoints: Vec<EndpointStats>,
    pub status_code_distribution: HashMap<String, u64>,
    pub requests_over_time: Vec<TimeBucket>,
    pub latency_percentiles: LatencyPercentiles,
}

// ─── Aggregator ──────────────────────────────────────────────────

/// Reads records from the provider and summarises them. Holds nothing
/// but the provider handle.
#[derive(Clone)]
pub struct DashboardAggregator {
    storage: Arc<dyn StorageProvider>,
}

impl DashboardAggregator {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self { storage }
    }

    /// Storage failures propagate; an error is never reported as an
    /// empty summary.
    pub async fn get_dashboard_data(&self, window: TimeWindow) -> StorageResult<DashboardSummary> {
        let records = self.storage.get_requests(window).await?;
        Ok(summarize(&records))
    }
}

/// Pure aggregation over an in-memory record set.
pub fn summarize(records: &[RequestRecord]) -> DashboardSummary {
    DashboardSummary {
        total_requests: records.len() as u64,
        average_latency: average_latency(records),
        error_rate: error_rate(records),
        top_endpoints: endpoints::top_endpoints(records, ENDPOINT_LIMIT),
        slowest_endpoints: endpoints::slowest_endpoints(records, ENDPOINT_LIMIT),
        status_code_distribution: status_distribution(records),
        requests_over_time: requests_over_time(records),
        latency_percentiles: LatencyPercentiles::from_latencies(records.iter().map(|r| r.latency)),
    }
}

fn average_latency(records: &[RequestRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let total: i64 = records.iter().map(|r| r.latency).sum();
    total as f64 / records.len() as f64
}

fn error_rate(records: &[RequestRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let errors = records.iter().filter(|r| r.is_error()).count();
    errors as f64 / records.len() as f64 * 100.0
}

fn status_distribution(records: &[RequestRecord]) -> HashMap<String, u64> {
    let mut dist = HashMap::new();
    for r in records {
        *dist.entry(r.response.status_code.to_string()).or_insert(0) += 1;
    }
    dist
}

/// Hour buckets keyed by `floor(start / 1h) * 1h`, ascending.
fn requests_over_time(records: &[RequestRecord]) -> Vec<TimeBucket> {
    let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
    for r in records {
        let key = r.start_time.div_euclid(BUCKET_MS) * BUCKET_MS;
        *buckets.entry(key).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(timestamp_ms, count)| TimeBucket {
            timestamp_ms,
            timestamp: Utc
                .timestamp_millis_opt(timestamp_ms)
                .single()
                .unwrap_or_default(),
            count,
        })
        .collect()
}
