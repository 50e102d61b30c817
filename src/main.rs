use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use request_monitor::config::{
    CaptureConfig, RetentionConfig, ServerConfig, Settings, StorageConfig, DEFAULT_SENSITIVE_KEYS,
};
use request_monitor::error::Result;
use request_monitor::monitor::LogNotifier;
use request_monitor::storage::{SqlStorage, SqlStorageOptions};
use request_monitor::{
    retention, server, AppState, InMemoryStorage, Monitor, MonitorConfig, StorageProvider,
};

// ─── CLI Arguments ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Memory,
    Sqlite,
}

/// HTTP request monitor with a stats/dashboard API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture requests at all
    #[arg(long, env = "MONITOR_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    enabled: bool,

    /// Service name stamped on every record
    #[arg(long, env = "MONITOR_SERVICE_NAME", default_value = "request-monitor")]
    service_name: String,

    /// Fraction of requests to persist (0.0 - 1.0)
    #[arg(long, env = "MONITOR_SAMPLE_RATE", default_value_t = 1.0)]
    sample_rate: f64,

    /// URL prefix to skip, on top of the monitor's own routes; repeatable
    #[arg(long = "ignore-path", env = "MONITOR_IGNORE_PATHS", value_delimiter = ',')]
    ignore_paths: Vec<String>,

    /// Latency (ms) above which a request is reported as slow
    #[arg(long, env = "MONITOR_SLOW_REQUEST_THRESHOLD_MS", default_value_t = 1_000)]
    slow_request_threshold_ms: i64,

    /// Fire the slow-request alert hook
    #[arg(long, env = "MONITOR_ALERTS_ENABLED")]
    alerts_enabled: bool,

    /// Alert target handed to the notifier
    #[arg(long, env = "MONITOR_ALERT_WEBHOOK")]
    alert_webhook: Option<String>,

    /// Largest request/response body (bytes) copied into a record; 0 disables
    #[arg(long, env = "MONITOR_MAX_BODY_SIZE", default_value_t = 4_096)]
    max_body_size: usize,

    /// Extra header/query/body key to mask; repeatable
    #[arg(long = "sensitive-key", env = "MONITOR_SENSITIVE_KEYS", value_delimiter = ',')]
    sensitive_keys: Vec<String>,

    /// Storage backend
    #[arg(long, env = "MONITOR_STORAGE", value_enum, default_value = "memory")]
    storage: Backend,

    /// Database URL for the sqlite backend
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://request-monitor.db")]
    database_url: String,

    /// Pool size for the sqlite backend
    #[arg(long, env = "MONITOR_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Delete records older than this many hours (disabled when unset)
    #[arg(long, env = "MONITOR_RETENTION_HOURS")]
    retention_hours: Option<u64>,

    /// Seconds between retention sweeps
    #[arg(long, env = "MONITOR_RETENTION_INTERVAL_SECS", default_value_t = 300)]
    retention_interval_secs: u64,

    /// HTTP bind address
    #[arg(long, env = "MONITOR_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// Directory served as the dashboard UI
    #[arg(long, env = "MONITOR_STATIC_DIR", default_value = "static")]
    static_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut ignore_paths: Vec<String> =
            server::OWN_ROUTE_PREFIXES.iter().map(|p| p.to_string()).collect();
        for path in &self.ignore_paths {
            if !ignore_paths.contains(path) {
                ignore_paths.push(path.clone());
            }
        }

        let mut sensitive_keys: Vec<String> =
            DEFAULT_SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect();
        sensitive_keys.extend(self.sensitive_keys.iter().cloned());

        Settings {
            monitor: MonitorConfig {
                enabled: self.enabled,
                service_name: self.service_name.clone(),
                ignore_paths,
                sample_rate: self.sample_rate,
                slow_request_threshold_ms: self.slow_request_threshold_ms,
                alerts_enabled: self.alerts_enabled,
                alert_webhook: self.alert_webhook.clone(),
            },
            storage: match self.storage {
                Backend::Memory => StorageConfig::Memory,
                Backend::Sqlite => StorageConfig::Sqlite {
                    url: self.database_url.clone(),
                    max_connections: self.max_connections,
                },
            },
            retention: RetentionConfig {
                max_age: self
                    .retention_hours
                    .map(|h| Duration::from_secs(h.saturating_mul(3_600))),
                interval: Duration::from_secs(self.retention_interval_secs),
            },
            server: ServerConfig {
                bind: self.bind.clone(),
                static_dir: self.static_dir.clone(),
            },
            capture: CaptureConfig {
                max_body_size: self.max_body_size,
                sensitive_keys,
            },
        }
    }
}

// ─── Main ────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let settings = args.settings();
    settings.validate()?;

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  REQUEST MONITOR                            ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Open storage ──────────────────────────────────────────
    let storage = open_storage(&settings.storage).await?;

    // ── 2. Build capture pipeline + shared state ─────────────────
    let mut monitor = Monitor::new(settings.monitor.clone(), storage.clone());
    if let Some(target) = settings.monitor.alert_target() {
        monitor = monitor.with_notifier(Arc::new(LogNotifier::new(target)));
    }
    let state = Arc::new(AppState::new(Arc::new(monitor)));

    // ── 3. Retention sweeper ─────────────────────────────────────
    let sweeping = Arc::new(AtomicBool::new(true));
    let sweeper = settings.retention.max_age.map(|max_age| {
        info!(max_age_secs = max_age.as_secs(), "retention sweeper enabled");
        retention::spawn_sweeper(
            storage.clone(),
            max_age,
            settings.retention.interval,
            sweeping.clone(),
        )
    });

    // ── 4. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state, &settings.capture, &settings.server.static_dir);

    // ── 5. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;

    info!(addr = %settings.server.bind, "server listening");
    println!("Dashboard       → http://{}/dashboard/", settings.server.bind);
    println!("Dashboard JSON  → http://{}/api/dashboard", settings.server.bind);
    println!("Dashboard SSE   → http://{}/api/dashboard/stream", settings.server.bind);
    println!("Stats JSON      → http://{}/api/stats", settings.server.bind);
    println!();

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // ── 6. Tear down ─────────────────────────────────────────────
    sweeping.store(false, std::sync::atomic::Ordering::SeqCst);
    if let Some(handle) = sweeper {
        handle.abort();
    }
    if let Err(e) = storage.close().await {
        error!(error = %e, "failed to close storage");
    }

    served?;
    info!("server stopped");
    Ok(())
}

async fn open_storage(config: &StorageConfig) -> Result<Arc<dyn StorageProvider>> {
    let storage: Arc<dyn StorageProvider> = match config {
        StorageConfig::Memory => {
            info!("using in-memory storage");
            Arc::new(InMemoryStorage::new())
        }
        StorageConfig::Sqlite {
            url,
            max_connections,
        } => {
            info!(%url, "using sqlite storage");
            let options = SqlStorageOptions {
                url: url.clone(),
                max_connections: *max_connections,
            };
            Arc::new(SqlStorage::connect_lazy(&options)?)
        }
    };

    storage.initialize().await.map_err(|e| {
        error!(error = %e, "storage initialization failed");
        e
    })?;
    Ok(storage)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
