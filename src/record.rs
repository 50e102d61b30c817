use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque request/response body. Any JSON-shaped value round-trips through
/// every storage backend.
pub type Payload = serde_json::Value;

/// Header or query-string map as observed on the wire.
pub type StringMap = HashMap<String, String>;

// ─── Snapshots (built by framework adapters) ────────────────────

/// The request half of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    /// Raw URL as received, path plus query string.
    pub url: String,
    #[serde(default)]
    pub headers: StringMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<StringMap>,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            query: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Payload) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: StringMap) -> Self {
        self.query = Some(query);
        self
    }
}

/// The response half of an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    #[serde(default)]
    pub headers: StringMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Payload>,
}

impl ResponseSnapshot {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Payload) -> Self {
        self.body = Some(body);
        self
    }
}

// ─── Stored record ───────────────────────────────────────────────

/// One captured request/response observation.
///
/// Immutable once handed to a storage provider; corrections are a
/// delete followed by a fresh insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Epoch milliseconds.
    pub end_time: i64,
    /// `end_time - start_time`, milliseconds.
    pub latency: i64,
    pub service_name: String,
}

impl RequestRecord {
    /// Assemble a record, deriving latency from the two timestamps.
    pub fn new(
        id: impl Into<String>,
        request: RequestSnapshot,
        response: ResponseSnapshot,
        start_time: i64,
        end_time: i64,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            request,
            response,
            start_time,
            end_time,
            latency: end_time - start_time,
            service_name: service_name.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.status_code >= 400
    }
}

// ─── Time window ─────────────────────────────────────────────────

/// Closed time range `[start, end]` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Window of a single instant.
    pub fn instant(at: i64) -> Self {
        Self { start: at, end: at }
    }

    /// True when the record's `[start_time, end_time]` interval touches the
    /// window at all: it starts inside, ends inside, or spans it.
    pub fn overlaps(&self, record: &RequestRecord) -> bool {
        (record.start_time >= self.start && record.start_time <= self.end)
            || (record.end_time >= self.start && record.end_time <= self.end)
            || (record.start_time <= self.start && record.end_time >= self.end)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
