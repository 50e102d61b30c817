//! Request monitor: captures HTTP request/response observations, stores
//! them behind a pluggable storage provider, and serves aggregated
//! statistics for a dashboard.
//!
//! ```text
//!  adapter (axum middleware) ──▶ Monitor::log_request ──▶ StorageProvider
//!                                                            ▲
//!  HTTP API / SSE ──▶ Monitor::get_request_stats ────────────┤
//!                 └─▶ DashboardAggregator::get_dashboard_data┘
//! ```

use std::sync::Arc;

pub mod config;
pub mod dashboard;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod monitor;
pub mod record;
pub mod retention;
pub mod server;
pub mod storage;

pub use config::MonitorConfig;
pub use dashboard::{DashboardAggregator, DashboardSummary};
pub use error::{Error, Result, StorageError};
pub use monitor::{CaptureOutcome, Monitor};
pub use record::{Payload, RequestRecord, RequestSnapshot, ResponseSnapshot, TimeWindow};
pub use storage::{InMemoryStorage, SearchCriteria, SqlStorage, StatsSummary, StorageProvider};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Capture pipeline; also the route to the storage provider.
    pub monitor: Arc<Monitor>,

    /// Read side for dashboard summaries.
    pub dashboard: DashboardAggregator,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        let dashboard = DashboardAggregator::new(monitor.storage().clone());
        Self { monitor, dashboard }
    }
}
