use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::record::RequestRecord;

/// Per-URL summary row on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub url: String,
    pub total_requests: u64,
    pub average_latency: f64,
    /// Percentage of requests with status ≥ 400. Only tracked for the
    /// volume ranking; the latency ranking leaves it at 0.
    pub error_rate: f64,
}

impl EndpointStats {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            total_requests: 0,
            average_latency: 0.0,
            error_rate: 0.0,
        }
    }

    /// Fold one more observation in with a running mean:
    /// `mean_n = (mean_{n-1} * (n - 1) + x) / n`.
    fn push(&mut self, latency: i64, is_error: Option<bool>) {
        self.total_requests += 1;
        let n = self.total_requests as f64;
        self.average_latency = running_mean(self.average_latency, n, latency as f64);
        if let Some(is_error) = is_error {
            let sample = if is_error { 100.0 } else { 0.0 };
            self.error_rate = running_mean(self.error_rate, n, sample);
        }
    }
}

/// Incremental mean update where `n` already counts `value`.
pub fn running_mean(old_mean: f64, n: f64, value: f64) -> f64 {
    (old_mean * (n - 1.0) + value) / n
}

/// Group records by raw URL (no path-parameter normalisation).
fn group<'a>(
    records: impl IntoIterator<Item = &'a RequestRecord>,
    track_errors: bool,
) -> Vec<EndpointStats> {
    let mut by_url: HashMap<&str, EndpointStats> = HashMap::new();
    for r in records {
        by_url
            .entry(r.request.url.as_str())
            .or_insert_with(|| EndpointStats::new(&r.request.url))
            .push(r.latency, track_errors.then(|| r.is_error()));
    }
    by_url.into_values().collect()
}

/// The `limit` URLs with the most requests, busiest first.
pub fn top_endpoints<'a>(
    records: impl IntoIterator<Item = &'a RequestRecord>,
    limit: usize,
) -> Vec<EndpointStats> {
    let mut rows = group(records, true);
    // Ties fall back to URL order so output is deterministic
    rows.sort_by(|a, b| {
        b.total_requests
            .cmp(&a.total_requests)
            .then_with(|| a.url.cmp(&b.url))
    });
    rows.truncate(limit);
    rows
}

/// The `limit` URLs with the highest mean latency, slowest first.
pub fn slowest_endpoints<'a>(
    records: impl IntoIterator<Item = &'a RequestRecord>,
    limit: usize,
) -> Vec<EndpointStats> {
    let mut rows = group(records, false);
    rows.sort_by(|a, b| {
        b.average_latency
            .total_cmp(&a.average_latency)
            .then_with(|| a.url.cmp(&b.url))
    });
    rows.truncate(limit);
    rows
}
