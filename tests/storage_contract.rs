//! Both storage backends run the same scenarios and must agree.

use std::sync::Arc;

use request_monitor::storage::{InMemoryStorage, SearchCriteria, SqlStorage, StorageProvider};
use request_monitor::{RequestRecord, RequestSnapshot, ResponseSnapshot, TimeWindow};
use serde_json::json;

// ─── Helpers ─────────────────────────────────────────────────────

async fn backends() -> Vec<(&'static str, Arc<dyn StorageProvider>)> {
    let sql = SqlStorage::in_memory().unwrap();
    sql.initialize().await.unwrap();
    vec![
        ("memory", Arc::new(InMemoryStorage::new())),
        ("sqlite", Arc::new(sql)),
    ]
}

fn record(id: &str, method: &str, url: &str, status: u16, start: i64, end: i64) -> RequestRecord {
    RequestRecord::new(
        id,
        RequestSnapshot::new(method, url),
        ResponseSnapshot::new(status),
        start,
        end,
        "svc",
    )
}

// ─── Scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn empty_store_reports_zeros() {
    for (name, storage) in backends().await {
        let stats = storage.get_stats(TimeWindow::new(0, i64::MAX)).await.unwrap();
        assert_eq!(stats.total_requests, 0, "{name}");
        assert_eq!(stats.average_latency, 0.0, "{name}");
        assert_eq!(stats.min_latency, 0, "{name}");
        assert_eq!(stats.max_latency, 0, "{name}");
        assert!(stats.requests_per_endpoint.is_empty(), "{name}");
        assert!(stats.status_code_distribution.is_empty(), "{name}");
        assert!(storage.get_requests(TimeWindow::new(0, i64::MAX)).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn stats_aggregate_overlapping_records() {
    for (name, storage) in backends().await {
        storage.store(record("1", "GET", "/a", 200, 1_000, 1_100)).await.unwrap();
        storage.store(record("2", "GET", "/a", 500, 2_000, 2_300)).await.unwrap();
        storage.store(record("3", "POST", "/b", 201, 3_000, 3_050)).await.unwrap();

        let stats = storage.get_stats(TimeWindow::new(0, 10_000)).await.unwrap();
        assert_eq!(stats.total_requests, 3, "{name}");
        assert_eq!(stats.min_latency, 50, "{name}");
        assert_eq!(stats.max_latency, 300, "{name}");
        assert!((stats.average_latency - 150.0).abs() < 1e-9, "{name}");
        assert_eq!(stats.requests_per_endpoint["/a"], 2, "{name}");
        assert_eq!(stats.requests_per_endpoint["/b"], 1, "{name}");
        assert_eq!(stats.status_code_distribution["200"], 1, "{name}");
        assert_eq!(stats.status_code_distribution["500"], 1, "{name}");
        assert_eq!(stats.status_code_distribution["201"], 1, "{name}");
    }
}

#[tokio::test]
async fn window_uses_any_overlap() {
    for (name, storage) in backends().await {
        // starts inside, ends inside, spans, disjoint
        storage.store(record("in-start", "GET", "/", 200, 150, 400)).await.unwrap();
        storage.store(record("in-end", "GET", "/", 200, 50, 120)).await.unwrap();
        storage.store(record("spans", "GET", "/", 200, 0, 500)).await.unwrap();
        storage.store(record("before", "GET", "/", 200, 0, 99)).await.unwrap();
        storage.store(record("after", "GET", "/", 200, 201, 300)).await.unwrap();

        let mut ids: Vec<String> = storage
            .get_requests(TimeWindow::new(100, 200))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["in-end", "in-start", "spans"], "{name}");
    }
}

#[tokio::test]
async fn single_instant_window_matches_exactly_one() {
    for (name, storage) in backends().await {
        storage.store(record("hit", "GET", "/", 200, 1_000, 1_000)).await.unwrap();
        storage.store(record("miss", "GET", "/", 200, 1_001, 1_010)).await.unwrap();

        let stats = storage.get_stats(TimeWindow::instant(1_000)).await.unwrap();
        assert_eq!(stats.total_requests, 1, "{name}");
        assert_eq!(stats.max_latency, 0, "{name}");
    }
}

#[tokio::test]
async fn get_by_id_round_trips_every_field() {
    for (name, storage) in backends().await {
        let original = RequestRecord::new(
            "full",
            RequestSnapshot::new("PUT", "/items/7?dry=1")
                .with_header("content-type", "application/json")
                .with_body(json!({"qty": 3, "tags": ["a", "b"]}))
                .with_query([("dry".to_string(), "1".to_string())].into_iter().collect()),
            ResponseSnapshot::new(422)
                .with_header("x-trace", "abc")
                .with_body(json!({"error": "bad qty"})),
            5_000,
            5_075,
            "inventory",
        );
        storage.store(original.clone()).await.unwrap();

        let loaded = storage.get_request_by_id("full").await.unwrap();
        assert_eq!(loaded, Some(original), "{name}");

        // a JSON null body is a body, not a missing one
        let null_body = RequestRecord::new(
            "null-body",
            RequestSnapshot::new("POST", "/x").with_body(json!(null)),
            ResponseSnapshot::new(200).with_body(json!(null)),
            6_000,
            6_001,
            "inventory",
        );
        storage.store(null_body.clone()).await.unwrap();
        let loaded = storage.get_request_by_id("null-body").await.unwrap().unwrap();
        assert_eq!(loaded.request.body, Some(json!(null)), "{name}");
        assert_eq!(loaded, null_body, "{name}");

        let bare = record("bare", "GET", "/", 200, 7_000, 7_001);
        storage.store(bare.clone()).await.unwrap();
        let loaded = storage.get_request_by_id("bare").await.unwrap();
        assert_eq!(loaded, Some(bare), "{name}");
        assert_eq!(storage.get_request_by_id("nope").await.unwrap(), None, "{name}");
    }
}

#[tokio::test]
async fn prune_removes_exact_count_and_stats_follow() {
    for (name, storage) in backends().await {
        for i in 0..10 {
            let start = i * 1_000;
            storage
                .store(record(&format!("r{i}"), "GET", "/p", 200, start, start + 10))
                .await
                .unwrap();
        }

        // strictly before 4_000: r0..r3
        let deleted = storage.delete_requests_older_than(4_000).await.unwrap();
        assert_eq!(deleted, 4, "{name}");

        let stats = storage.get_stats(TimeWindow::new(0, 100_000)).await.unwrap();
        assert_eq!(stats.total_requests, 6, "{name}");
        assert!(storage.get_request_by_id("r3").await.unwrap().is_none(), "{name}");
        assert!(storage.get_request_by_id("r4").await.unwrap().is_some(), "{name}");

        assert_eq!(storage.delete_requests_older_than(4_000).await.unwrap(), 0, "{name}");
    }
}

#[tokio::test]
async fn search_filters_and_orders_newest_first() {
    for (name, storage) in backends().await {
        storage.store(record("g1", "GET", "/a", 200, 1_000, 1_010)).await.unwrap();
        storage.store(record("p1", "POST", "/a", 201, 2_000, 2_010)).await.unwrap();
        storage.store(record("g2", "GET", "/a", 404, 3_000, 3_010)).await.unwrap();
        storage.store(record("g3", "GET", "/b", 200, 4_000, 4_010)).await.unwrap();

        let ids = |records: Vec<RequestRecord>| -> Vec<String> {
            records.into_iter().map(|r| r.id).collect()
        };

        let all = storage
            .search_requests(&SearchCriteria::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(ids(all), vec!["g3", "g2", "p1", "g1"], "{name}");

        let gets_on_a = SearchCriteria {
            method: Some("GET".into()),
            url: Some("/a".into()),
            ..Default::default()
        };
        let found = storage.search_requests(&gets_on_a, 10, 0).await.unwrap();
        assert_eq!(ids(found), vec!["g2", "g1"], "{name}");

        let not_found = SearchCriteria {
            status_code: Some(404),
            ..Default::default()
        };
        let found = storage.search_requests(&not_found, 10, 0).await.unwrap();
        assert_eq!(ids(found), vec!["g2"], "{name}");

        let page = storage
            .search_requests(&SearchCriteria::default(), 2, 1)
            .await
            .unwrap();
        assert_eq!(ids(page), vec!["g2", "p1"], "{name}");
    }
}

#[tokio::test]
async fn search_ties_keep_insertion_order() {
    for (name, storage) in backends().await {
        for id in ["first", "second", "third"] {
            storage.store(record(id, "GET", "/t", 200, 7_000, 7_001)).await.unwrap();
        }
        let found: Vec<String> = storage
            .search_requests(&SearchCriteria::default(), 10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(found, vec!["first", "second", "third"], "{name}");
    }
}
