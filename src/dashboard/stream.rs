use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

use super::DashboardSummary;
use crate::handlers::{ApiError, WindowQuery};
use crate::record::{now_ms, TimeWindow};
use crate::AppState;

/// Push interval for the live dashboard
const STREAM_TICK: Duration = Duration::from_secs(2);

// ─── GET /api/dashboard ──────────────────────────────────────────
/// One summary for an explicit (or default last-24h) window.

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WindowQuery>,
) -> Result<Json<DashboardSummary>, ApiError> {
    let summary = state.dashboard.get_dashboard_data(q.window()?).await?;
    Ok(Json(summary))
}

// ─── GET /api/dashboard/stream ───────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a `DashboardSummary` for the trailing window every 2 s.
/// A failed read is sent as an `error` event, never as an empty summary.

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
}

fn default_window_minutes() -> i64 {
    60
}

pub async fn dashboard_stream(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StreamQuery>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let span_ms = q.window_minutes.clamp(1, 24 * 60) * 60_000;
    let (tx, rx) = tokio::sync::mpsc::channel(4);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STREAM_TICK);
        loop {
            interval.tick().await;

            let end = now_ms();
            let event = match state
                .dashboard
                .get_dashboard_data(TimeWindow::new(end - span_ms, end))
                .await
            {
                Ok(summary) => {
                    let json = serde_json::to_string(&summary).unwrap_or_default();
                    Event::default().data(json)
                }
                Err(e) => Event::default().event("error").data(e.to_string()),
            };

            // Receiver gone: the client disconnected
            if tx.send(Ok(event)).await.is_err() {
                break;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
