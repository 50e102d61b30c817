use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::record::RequestRecord;
use crate::storage::{SearchCriteria, StatsSummary};
use crate::AppState;

use super::{ApiError, WindowQuery};

// ─── Request / response types ────────────────────────────────────

/// Query-string form of [`SearchCriteria`] plus pagination.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub method: Option<String>,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub service_name: Option<String>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl SearchQuery {
    fn criteria(&self) -> SearchCriteria {
        SearchCriteria {
            method: self.method.clone(),
            url: self.url.clone(),
            status_code: self.status_code,
            service_name: self.service_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    pub before: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PruneResult {
    pub deleted: u64,
}

// ─── GET /api/stats ──────────────────────────────────────────────

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WindowQuery>,
) -> Result<Json<StatsSummary>, ApiError> {
    let stats = state.monitor.get_request_stats(q.window()?).await?;
    Ok(Json(stats))
}

// ─── GET /api/requests/:id ───────────────────────────────────────

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RequestRecord>, ApiError> {
    state
        .monitor
        .storage()
        .get_request_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("request '{id}' not found")))
}

// ─── GET /api/requests ───────────────────────────────────────────

pub async fn search_requests(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<RequestRecord>>, ApiError> {
    if q.limit == 0 || q.limit > 1_000 {
        return Err(ApiError::BadRequest(
            "limit must be between 1 and 1000".into(),
        ));
    }
    let records = state
        .monitor
        .storage()
        .search_requests(&q.criteria(), q.limit, q.offset)
        .await?;
    Ok(Json(records))
}

// ─── DELETE /api/requests?before=… ───────────────────────────────

pub async fn prune_requests(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PruneQuery>,
) -> Result<Json<PruneResult>, ApiError> {
    let deleted = state
        .monitor
        .storage()
        .delete_requests_older_than(q.before.timestamp_millis())
        .await?;
    tracing::info!(deleted, cutoff = %q.before, "pruned request records");
    Ok(Json(PruneResult { deleted }))
}
