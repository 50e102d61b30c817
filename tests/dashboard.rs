use std::sync::Arc;

use async_trait::async_trait;
use request_monitor::error::StorageResult;
use request_monitor::storage::{SearchCriteria, StatsSummary};
use request_monitor::{
    DashboardAggregator, InMemoryStorage, RequestRecord, RequestSnapshot, ResponseSnapshot,
    StorageError, StorageProvider, TimeWindow,
};

fn record(id: String, url: &str, status: u16, start: i64, latency: i64) -> RequestRecord {
    RequestRecord::new(
        id,
        RequestSnapshot::new("GET", url),
        ResponseSnapshot::new(status),
        start,
        start + latency,
        "svc",
    )
}

#[tokio::test]
async fn busiest_and_slowest_rankings() {
    let storage = Arc::new(InMemoryStorage::new());
    for i in 0..10 {
        storage.store(record(format!("a{i}"), "/a", 200, i * 1_000, 50)).await.unwrap();
    }
    for i in 0..5 {
        let status = if i == 0 { 500 } else { 200 };
        storage.store(record(format!("b{i}"), "/b", status, i * 1_000, 200)).await.unwrap();
    }

    let dashboard = DashboardAggregator::new(storage);
    let summary = dashboard
        .get_dashboard_data(TimeWindow::new(0, 3_600_000))
        .await
        .unwrap();

    assert_eq!(summary.total_requests, 15);
    assert!((summary.average_latency - 100.0).abs() < 1e-9);
    assert!((summary.error_rate - 100.0 / 15.0).abs() < 1e-9);

    assert_eq!(summary.top_endpoints[0].url, "/a");
    assert_eq!(summary.top_endpoints[0].total_requests, 10);
    assert_eq!(summary.top_endpoints[1].url, "/b");
    assert!((summary.top_endpoints[1].error_rate - 20.0).abs() < 1e-9);

    assert_eq!(summary.slowest_endpoints[0].url, "/b");
    assert!((summary.slowest_endpoints[0].average_latency - 200.0).abs() < 1e-9);
    assert_eq!(summary.slowest_endpoints[1].url, "/a");

    assert_eq!(summary.status_code_distribution["200"], 14);
    assert_eq!(summary.status_code_distribution["500"], 1);

    // all starts fall in the first hour of the epoch
    assert_eq!(summary.requests_over_time.len(), 1);
    assert_eq!(summary.requests_over_time[0].timestamp_ms, 0);
    assert_eq!(summary.requests_over_time[0].count, 15);

    assert_eq!(summary.latency_percentiles.count, 15);
    assert_eq!(summary.latency_percentiles.min, 50);
}

#[tokio::test]
async fn rankings_are_capped_at_five() {
    let storage = Arc::new(InMemoryStorage::new());
    for (n, url) in ["/1", "/2", "/3", "/4", "/5", "/6", "/7"].into_iter().enumerate() {
        storage
            .store(record(format!("r{n}"), url, 200, 0, n as i64 * 10))
            .await
            .unwrap();
    }
    let summary = DashboardAggregator::new(storage)
        .get_dashboard_data(TimeWindow::new(0, 1_000))
        .await
        .unwrap();
    assert_eq!(summary.top_endpoints.len(), 5);
    assert_eq!(summary.slowest_endpoints.len(), 5);
    assert_eq!(summary.slowest_endpoints[0].url, "/7");
}

struct FailingReads;

#[async_trait]
impl StorageProvider for FailingReads {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }
    async fn store(&self, _record: RequestRecord) -> StorageResult<()> {
        Ok(())
    }
    async fn get_stats(&self, _window: TimeWindow) -> StorageResult<StatsSummary> {
        Err(StorageError::Query("timeout".into()))
    }
    async fn get_requests(&self, _window: TimeWindow) -> StorageResult<Vec<RequestRecord>> {
        Err(StorageError::Query("timeout".into()))
    }
    async fn get_request_by_id(&self, _id: &str) -> StorageResult<Option<RequestRecord>> {
        Ok(None)
    }
    async fn search_requests(
        &self,
        _criteria: &SearchCriteria,
        _limit: usize,
        _offset: usize,
    ) -> StorageResult<Vec<RequestRecord>> {
        Ok(Vec::new())
    }
    async fn delete_requests_older_than(&self, _cutoff: i64) -> StorageResult<u64> {
        Ok(0)
    }
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn read_failure_is_not_an_empty_summary() {
    let dashboard = DashboardAggregator::new(Arc::new(FailingReads));
    let result = dashboard.get_dashboard_data(TimeWindow::new(0, 1)).await;
    assert!(matches!(result, Err(StorageError::Query(_))));
}
