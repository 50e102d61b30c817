pub mod requests;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::StorageError;
use crate::record::TimeWindow;

// ─── Time window query ───────────────────────────────────────────

/// `?from=…&to=…` (RFC 3339). Defaults to the last 24 hours.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl WindowQuery {
    pub fn window(&self) -> Result<TimeWindow, ApiError> {
        let to = self.to.unwrap_or_else(Utc::now);
        let from = self.from.unwrap_or(to - Duration::hours(24));
        if from > to {
            return Err(ApiError::BadRequest(
                "`from` must not be later than `to`".into(),
            ));
        }
        Ok(TimeWindow::new(from.timestamp_millis(), to.timestamp_millis()))
    }
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Storage(e) => {
                tracing::error!(error = %e, "storage query failed");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
