use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::debug;

use super::{SearchCriteria, StatsSummary, StorageProvider};
use crate::error::{StorageError, StorageResult};
use crate::record::{Payload, RequestRecord, RequestSnapshot, ResponseSnapshot, StringMap, TimeWindow};

// ─── Schema ──────────────────────────────────────────────────────

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS monitored_requests (
        id               TEXT PRIMARY KEY NOT NULL,
        method           TEXT NOT NULL,
        url              TEXT NOT NULL,
        status_code      INTEGER NOT NULL,
        start_time       INTEGER NOT NULL,
        end_time         INTEGER NOT NULL,
        latency          INTEGER NOT NULL,
        service_name     TEXT NOT NULL,
        request_headers  TEXT NOT NULL,
        response_headers TEXT NOT NULL,
        request_body     TEXT,
        response_body    TEXT,
        request_query    TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_monitored_requests_start ON monitored_requests (start_time)",
    "CREATE INDEX IF NOT EXISTS idx_monitored_requests_end ON monitored_requests (end_time)",
];

const COLUMNS: &str = "id, method, url, status_code, start_time, end_time, latency, \
     service_name, request_headers, response_headers, request_body, response_body, request_query";

/// Any-overlap filter; `?1` is the window start, `?2` the window end.
const OVERLAP: &str = "((start_time >= ?1 AND start_time <= ?2) \
     OR (end_time >= ?1 AND end_time <= ?2) \
     OR (start_time <= ?1 AND end_time >= ?2))";

// ─── Configuration ───────────────────────────────────────────────

/// Connection settings for [`SqlStorage`].
#[derive(Debug, Clone)]
pub struct SqlStorageOptions {
    /// e.g. `sqlite://monitor.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
}

impl SqlStorageOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
        }
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

// ─── Provider ────────────────────────────────────────────────────

/// Relational record store backed by SQLite through a sqlx pool.
///
/// Header maps, bodies and the query map are stored as JSON text.
#[derive(Debug, Clone)]
pub struct SqlStorage {
    pool: SqlitePool,
}

impl SqlStorage {
    /// Build the pool without touching the database. Connection problems
    /// surface from [`StorageProvider::initialize`].
    pub fn connect_lazy(options: &SqlStorageOptions) -> StorageResult<Self> {
        let connect = SqliteConnectOptions::from_str(&options.url)
            .map_err(|e| StorageError::Init(format!("invalid database url: {e}")))?
            .create_if_missing(true);

        // A private in-memory database lives and dies with its connection,
        // so pin exactly one and never recycle it.
        let pool = if options.is_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(options.max_connections.max(1))
        };

        Ok(Self {
            pool: pool.connect_lazy_with(connect),
        })
    }

    /// Private in-memory database, handy for tests.
    pub fn in_memory() -> StorageResult<Self> {
        Self::connect_lazy(&SqlStorageOptions::new("sqlite::memory:"))
    }
}

#[async_trait]
impl StorageProvider for SqlStorage {
    async fn initialize(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Init(e.to_string()))?;
        }
        debug!("monitored_requests schema ready");
        Ok(())
    }

    async fn store(&self, record: RequestRecord) -> StorageResult<()> {
        let encoded = EncodedBlobs::from_record(&record).map_err(StorageError::Write)?;

        let query = format!(
            "INSERT INTO monitored_requests ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        );
        sqlx::query(&query)
            .bind(&record.id)
            .bind(&record.request.method)
            .bind(&record.request.url)
            .bind(i64::from(record.response.status_code))
            .bind(record.start_time)
            .bind(record.end_time)
            .bind(record.latency)
            .bind(&record.service_name)
            .bind(encoded.request_headers)
            .bind(encoded.response_headers)
            .bind(encoded.request_body)
            .bind(encoded.response_body)
            .bind(encoded.request_query)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Write(e.to_string()))?;

        Ok(())
    }

    async fn get_stats(&self, window: TimeWindow) -> StorageResult<StatsSummary> {
        let query = format!(
            "SELECT url, status_code, COUNT(*) AS count, SUM(latency) AS latency_sum, \
                    MIN(latency) AS min_latency, MAX(latency) AS max_latency \
             FROM monitored_requests WHERE {OVERLAP} GROUP BY url, status_code"
        );
        let rows: Vec<StatsRow> = sqlx::query_as(&query)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        // Groups are folded back together weighted by count
        let mut stats = StatsSummary::default();
        let mut latency_sum: i64 = 0;
        for row in rows {
            let count = row.count as u64;
            if stats.total_requests == 0 {
                stats.min_latency = row.min_latency;
                stats.max_latency = row.max_latency;
            } else {
                stats.min_latency = stats.min_latency.min(row.min_latency);
                stats.max_latency = stats.max_latency.max(row.max_latency);
            }
            stats.total_requests += count;
            latency_sum += row.latency_sum;
            *stats.requests_per_endpoint.entry(row.url).or_insert(0) += count;
            *stats
                .status_code_distribution
                .entry(row.status_code.to_string())
                .or_insert(0) += count;
        }
        if stats.total_requests > 0 {
            stats.average_latency = latency_sum as f64 / stats.total_requests as f64;
        }
        Ok(stats)
    }

    async fn get_requests(&self, window: TimeWindow) -> StorageResult<Vec<RequestRecord>> {
        let query = format!("SELECT {COLUMNS} FROM monitored_requests WHERE {OVERLAP}");
        let rows: Vec<RequestRow> = sqlx::query_as(&query)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(RequestRecord::try_from).collect()
    }

    async fn get_request_by_id(&self, id: &str) -> StorageResult<Option<RequestRecord>> {
        let query = format!("SELECT {COLUMNS} FROM monitored_requests WHERE id = ?1");
        let row: Option<RequestRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(RequestRecord::try_from).transpose()
    }

    async fn search_requests(
        &self,
        criteria: &SearchCriteria,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<RequestRecord>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM monitored_requests"));

        if !criteria.is_empty() {
            qb.push(" WHERE ");
            let mut clauses = qb.separated(" AND ");
            if let Some(method) = &criteria.method {
                clauses.push("method = ").push_bind_unseparated(method.clone());
            }
            if let Some(url) = &criteria.url {
                clauses.push("url = ").push_bind_unseparated(url.clone());
            }
            if let Some(status) = criteria.status_code {
                clauses.push("status_code = ").push_bind_unseparated(i64::from(status));
            }
            if let Some(service) = &criteria.service_name {
                clauses
                    .push("service_name = ")
                    .push_bind_unseparated(service.clone());
            }
        }

        // rowid breaks start-time ties in insertion order, like the memory store
        qb.push(" ORDER BY start_time DESC, rowid ASC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows: Vec<RequestRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(RequestRecord::try_from).collect()
    }

    async fn delete_requests_older_than(&self, cutoff: i64) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM monitored_requests WHERE start_time < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Write(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

// ─── Row mapping ─────────────────────────────────────────────────

#[derive(FromRow)]
struct StatsRow {
    url: String,
    status_code: i64,
    count: i64,
    latency_sum: i64,
    min_latency: i64,
    max_latency: i64,
}

#[derive(FromRow)]
struct RequestRow {
    id: String,
    method: String,
    url: String,
    status_code: i64,
    start_time: i64,
    end_time: i64,
    latency: i64,
    service_name: String,
    request_headers: String,
    response_headers: String,
    request_body: Option<String>,
    response_body: Option<String>,
    request_query: Option<String>,
}

/// JSON text for every non-scalar column. An absent optional value is SQL
/// `NULL`; a present JSON `null` is the text `null`.
struct EncodedBlobs {
    request_headers: String,
    response_headers: String,
    request_body: Option<String>,
    response_body: Option<String>,
    request_query: Option<String>,
}

impl EncodedBlobs {
    fn from_record(record: &RequestRecord) -> Result<Self, String> {
        Ok(Self {
            request_headers: encode(&record.request.headers)?,
            response_headers: encode(&record.response.headers)?,
            request_body: encode_opt(&record.request.body)?,
            response_body: encode_opt(&record.response.body)?,
            request_query: encode_opt(&record.request.query)?,
        })
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

fn encode_opt<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, String> {
    value.as_ref().map(encode).transpose()
}

fn decode<T: serde::de::DeserializeOwned>(column: &str, text: &str) -> StorageResult<T> {
    serde_json::from_str(text)
        .map_err(|e| StorageError::Query(format!("corrupt {column} column: {e}")))
}

fn decode_opt<T: serde::de::DeserializeOwned>(
    column: &str,
    text: Option<&str>,
) -> StorageResult<Option<T>> {
    text.map(|t| decode(column, t)).transpose()
}

impl TryFrom<RequestRow> for RequestRecord {
    type Error = StorageError;

    fn try_from(row: RequestRow) -> StorageResult<Self> {
        let status_code = u16::try_from(row.status_code)
            .map_err(|_| StorageError::Query(format!("invalid status code {}", row.status_code)))?;

        Ok(RequestRecord {
            request: RequestSnapshot {
                method: row.method,
                url: row.url,
                headers: decode::<StringMap>("request_headers", &row.request_headers)?,
                body: decode_opt::<Payload>("request_body", row.request_body.as_deref())?,
                query: decode_opt::<StringMap>("request_query", row.request_query.as_deref())?,
            },
            response: ResponseSnapshot {
                status_code,
                headers: decode::<StringMap>("response_headers", &row.response_headers)?,
                body: decode_opt::<Payload>("response_body", row.response_body.as_deref())?,
            },
            id: row.id,
            start_time: row.start_time,
            end_time: row.end_time,
            latency: row.latency,
            service_name: row.service_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn storage() -> SqlStorage {
        let s = SqlStorage::in_memory().unwrap();
        s.initialize().await.unwrap();
        s
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let s = storage().await;
        s.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_database_is_init_error() {
        let s = SqlStorage::connect_lazy(&SqlStorageOptions::new(
            "sqlite:///definitely/missing/dir/monitor.db",
        ))
        .unwrap();
        assert!(matches!(s.initialize().await, Err(StorageError::Init(_))));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let s = storage().await;
        let record = RequestRecord::new(
            "dup",
            RequestSnapshot::new("GET", "/"),
            ResponseSnapshot::new(200),
            0,
            1,
            "svc",
        );
        s.store(record.clone()).await.unwrap();
        assert!(matches!(s.store(record).await, Err(StorageError::Write(_))));
    }

    #[tokio::test]
    async fn test_blobs_round_trip() {
        let s = storage().await;
        let mut query = StringMap::new();
        query.insert("page".into(), "2".into());
        let record = RequestRecord::new(
            "blob",
            RequestSnapshot::new("POST", "/items?page=2")
                .with_header("content-type", "application/json")
                .with_body(json!({"name": "widget", "tags": ["a", "b"], "qty": 3}))
                .with_query(query),
            ResponseSnapshot::new(201).with_body(json!("created")),
            1_000,
            1_042,
            "svc",
        );
        s.store(record.clone()).await.unwrap();

        let loaded = s.get_request_by_id("blob").await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_json_null_body_differs_from_missing_body() {
        let s = storage().await;
        let with_null = RequestRecord::new(
            "null-body",
            RequestSnapshot::new("POST", "/x").with_body(Payload::Null),
            ResponseSnapshot::new(204),
            0,
            1,
            "svc",
        );
        let without = RequestRecord::new(
            "no-body",
            RequestSnapshot::new("POST", "/x"),
            ResponseSnapshot::new(204),
            0,
            1,
            "svc",
        );
        s.store(with_null).await.unwrap();
        s.store(without).await.unwrap();

        let loaded = s.get_request_by_id("null-body").await.unwrap().unwrap();
        assert_eq!(loaded.request.body, Some(Payload::Null));
        assert_eq!(loaded.response.body, None);

        let loaded = s.get_request_by_id("no-body").await.unwrap().unwrap();
        assert_eq!(loaded.request.body, None);
        assert_eq!(loaded.request.query, None);
    }
}
