//! Storage contract and its two backends.
//!
//! Both backends must be observationally identical: same overlap filter,
//! same ordering, same degenerate-case zeros.

pub mod memory;
pub mod sql;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::record::{RequestRecord, TimeWindow};

pub use memory::InMemoryStorage;
pub use sql::{SqlStorage, SqlStorageOptions};

// ─── Query types ─────────────────────────────────────────────────

/// Range-bounded numeric summary over stored records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_requests: u64,
    pub average_latency: f64,
    /// 0 when nothing matched.
    pub max_latency: i64,
    /// 0 when nothing matched.
    pub min_latency: i64,
    pub requests_per_endpoint: HashMap<String, u64>,
    /// Keyed by the status code rendered as a string.
    pub status_code_distribution: HashMap<String, u64>,
}

/// Exact-match filter for [`StorageProvider::search_requests`].
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub service_name: Option<String>,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.method.is_none()
            && self.url.is_none()
            && self.status_code.is_none()
            && self.service_name.is_none()
    }

    pub fn matches(&self, record: &RequestRecord) -> bool {
        self.method.as_deref().map_or(true, |m| record.request.method == m)
            && self.url.as_deref().map_or(true, |u| record.request.url == u)
            && self
                .status_code
                .map_or(true, |s| record.response.status_code == s)
            && self
                .service_name
                .as_deref()
                .map_or(true, |n| record.service_name == n)
    }
}

// ─── Provider trait ──────────────────────────────────────────────

/// Owner of the captured record set.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Prepare the backend (schema creation etc.). Safe to call twice.
    async fn initialize(&self) -> StorageResult<()>;

    /// Append one record. Ids are expected to be unique.
    async fn store(&self, record: RequestRecord) -> StorageResult<()>;

    /// Pre-aggregated summary of every record overlapping `window`.
    async fn get_stats(&self, window: TimeWindow) -> StorageResult<StatsSummary>;

    /// Every record overlapping `window`, in no particular order.
    async fn get_requests(&self, window: TimeWindow) -> StorageResult<Vec<RequestRecord>>;

    async fn get_request_by_id(&self, id: &str) -> StorageResult<Option<RequestRecord>>;

    /// Records matching `criteria`, newest start time first.
    async fn search_requests(
        &self,
        criteria: &SearchCriteria,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<RequestRecord>>;

    /// Remove records whose start time is strictly before `cutoff`.
    /// Returns the number removed.
    async fn delete_requests_older_than(&self, cutoff: i64) -> StorageResult<u64>;

    async fn close(&self) -> StorageResult<()>;
}

/// Fold an iterator of matched records into a [`StatsSummary`].
pub(crate) fn summarize<'a>(records: impl IntoIterator<Item = &'a RequestRecord>) -> StatsSummary {
    let mut stats = StatsSummary::default();
    let mut latency_sum: i64 = 0;

    for r in records {
        if stats.total_requests == 0 {
            stats.min_latency = r.latency;
            stats.max_latency = r.latency;
        } else {
            stats.min_latency = stats.min_latency.min(r.latency);
            stats.max_latency = stats.max_latency.max(r.latency);
        }
        stats.total_requests += 1;
        latency_sum += r.latency;

        *stats
            .requests_per_endpoint
            .entry(r.request.url.clone())
            .or_insert(0) += 1;
        *stats
            .status_code_distribution
            .entry(r.response.status_code.to_string())
            .or_insert(0) += 1;
    }

    if stats.total_requests > 0 {
        stats.average_latency = latency_sum as f64 / stats.total_requests as f64;
    }
    stats
}
