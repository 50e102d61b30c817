use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::redact::Redactor;
use crate::config::CaptureConfig;
use crate::monitor::Monitor;
use crate::record::{now_ms, Payload, RequestSnapshot, ResponseSnapshot, StringMap};

// ─── Middleware state ────────────────────────────────────────────

/// The monitor plus what the middleware copies out of each exchange.
pub struct Capture {
    monitor: Arc<Monitor>,
    redactor: Redactor,
    max_body_size: usize,
}

impl Capture {
    pub fn new(monitor: Arc<Monitor>, config: &CaptureConfig) -> Self {
        Self {
            monitor,
            redactor: Redactor::new(&config.sensitive_keys),
            max_body_size: config.max_body_size,
        }
    }

    /// Only JSON and plain-text bodies are kept. Streams such as
    /// `text/event-stream` never are.
    fn wants_body(&self, headers: &HeaderMap) -> bool {
        self.max_body_size > 0 && body_kind(headers).is_some()
    }

    fn redact(&self, request: &mut RequestSnapshot, response: &mut ResponseSnapshot) {
        self.redactor.mask_map(&mut request.headers);
        self.redactor.mask_map(&mut response.headers);
        if let Some(query) = request.query.as_mut() {
            self.redactor.mask_map(query);
        }
        for body in [request.body.as_mut(), response.body.as_mut()].into_iter().flatten() {
            self.redactor.mask_payload(body);
        }
    }
}

// ─── Middleware ──────────────────────────────────────────────────

/// Axum middleware that observes each exchange and hands it to the
/// [`Monitor`]. Status, headers and body reach the client unchanged.
///
/// JSON and text bodies up to `max_body_size` bytes are captured. A request
/// body is only buffered when its `content-length` is declared and within
/// that limit. Sensitive keys in headers, query and bodies are masked before
/// the record leaves the middleware.
///
/// Mount with `axum::middleware::from_fn_with_state(capture, capture_middleware)`.
pub async fn capture_middleware(
    State(capture): State<Arc<Capture>>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let mut request = request_snapshot(parts.method.as_str(), &parts.uri, &parts.headers);

    let body = if capture.wants_body(&parts.headers)
        && content_length(&parts.headers).is_some_and(|len| len <= capture.max_body_size)
    {
        match to_bytes(body, capture.max_body_size).await {
            Ok(bytes) => {
                request.body = payload(&parts.headers, &bytes);
                Body::from(bytes)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "failed to read request body");
                return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
            }
        }
    } else {
        body
    };
    let req = Request::from_parts(parts, body);

    let start = now_ms();
    let response = next.run(req).await;
    let end = now_ms();

    let (parts, body) = response.into_parts();
    let mut snapshot = ResponseSnapshot {
        status_code: parts.status.as_u16(),
        headers: header_map(&parts.headers),
        body: None,
    };

    let body = if capture.wants_body(&parts.headers) {
        let bytes = match to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %request.url, error = %e, "failed to read response body");
                Bytes::new()
            }
        };
        if bytes.len() <= capture.max_body_size {
            snapshot.body = payload(&parts.headers, &bytes);
        }
        Body::from(bytes)
    } else {
        body
    };

    capture.redact(&mut request, &mut snapshot);

    // Capture runs off the request path
    let monitor = capture.monitor.clone();
    tokio::spawn(async move {
        monitor.log_request(request, snapshot, start, end).await;
    });

    Response::from_parts(parts, body)
}

// ─── Snapshot helpers ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Text,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    if mime == "application/json" || mime.ends_with("+json") {
        Some(BodyKind::Json)
    } else if mime == "text/plain" {
        Some(BodyKind::Text)
    } else {
        None
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// JSON that fails to parse is kept as text.
fn payload(headers: &HeaderMap, bytes: &Bytes) -> Option<Payload> {
    if bytes.is_empty() {
        return None;
    }
    match body_kind(headers)? {
        BodyKind::Json => serde_json::from_slice(bytes)
            .ok()
            .or_else(|| text(bytes)),
        BodyKind::Text => text(bytes),
    }
}

fn text(bytes: &Bytes) -> Option<Payload> {
    std::str::from_utf8(bytes)
        .ok()
        .map(|s| Payload::String(s.to_owned()))
}

fn request_snapshot(method: &str, uri: &Uri, headers: &HeaderMap) -> RequestSnapshot {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());

    RequestSnapshot {
        method: method.to_owned(),
        url,
        headers: header_map(headers),
        body: None,
        query: uri.query().map(parse_query),
    }
}

/// Header values that are not valid UTF-8 are dropped.
fn header_map(headers: &HeaderMap) -> StringMap {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect()
}

fn parse_query(query: &str) -> StringMap {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        params.insert(
            urlencoding::decode(key).map(|k| k.into_owned()).unwrap_or_else(|_| key.to_owned()),
            urlencoding::decode(value).map(|v| v.into_owned()).unwrap_or_else(|_| value.to_owned()),
        );
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_are_decoded() {
        let q = parse_query("name=hello%20world&flag&empty=");
        assert_eq!(q["name"], "hello world");
        assert_eq!(q["flag"], "");
        assert_eq!(q["empty"], "");
    }

    fn headers(content_type: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        h
    }

    #[test]
    fn body_kind_follows_content_type() {
        assert_eq!(body_kind(&headers("application/json")), Some(BodyKind::Json));
        assert_eq!(
            body_kind(&headers("application/problem+json; charset=utf-8")),
            Some(BodyKind::Json)
        );
        assert_eq!(body_kind(&headers("text/plain")), Some(BodyKind::Text));
        assert_eq!(body_kind(&headers("text/event-stream")), None);
        assert_eq!(body_kind(&HeaderMap::new()), None);
    }

    #[test]
    fn payload_parses_json_and_keeps_bad_json_as_text() {
        let json = headers("application/json");
        assert_eq!(
            payload(&json, &Bytes::from_static(br#"{"a":1}"#)),
            Some(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            payload(&json, &Bytes::from_static(b"{oops")),
            Some(Payload::String("{oops".into()))
        );
        assert_eq!(payload(&json, &Bytes::new()), None);
    }

    #[test]
    fn snapshot_keeps_raw_path_and_query() {
        let uri: Uri = "/items/7?page=2".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", "abc".parse().unwrap());

        let snap = request_snapshot("GET", &uri, &headers);
        assert_eq!(snap.url, "/items/7?page=2");
        assert_eq!(snap.headers["x-trace"], "abc");
        assert_eq!(snap.query.unwrap()["page"], "2");
    }
}
