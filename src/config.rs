use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ─── Capture policy ──────────────────────────────────────────────

/// Capture policy. Read once when a [`Monitor`](crate::monitor::Monitor)
/// is built and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// URL prefixes that are never captured, e.g. `/health`.
    #[serde(default)]
    pub ignore_paths: Vec<String>,

    /// Probability (0–1) that an eligible request is persisted.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Requests slower than this are reported as slow.
    #[serde(default = "default_slow_threshold")]
    pub slow_request_threshold_ms: i64,

    #[serde(default)]
    pub alerts_enabled: bool,

    #[serde(default)]
    pub alert_webhook: Option<String>,
}

fn default_enabled() -> bool {
    true
}
fn default_service_name() -> String {
    "request-monitor".into()
}
fn default_sample_rate() -> f64 {
    1.0
}
fn default_slow_threshold() -> i64 {
    1_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            service_name: default_service_name(),
            ignore_paths: Vec::new(),
            sample_rate: default_sample_rate(),
            slow_request_threshold_ms: default_slow_threshold(),
            alerts_enabled: false,
            alert_webhook: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if self.slow_request_threshold_ms < 0 {
            return Err(ConfigError::SlowThreshold(self.slow_request_threshold_ms));
        }
        Ok(())
    }

    /// Alerts fire only when switched on and a target is configured.
    pub fn alert_target(&self) -> Option<&str> {
        if self.alerts_enabled {
            self.alert_webhook.as_deref()
        } else {
            None
        }
    }
}

// ─── Capture adapter ─────────────────────────────────────────────

/// Header, query and JSON body keys masked unless configured otherwise.
/// Matching is case-insensitive.
pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "password",
    "token",
    "secret",
];

/// What the HTTP middleware copies out of each exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bodies larger than this many bytes are not captured. 0 disables
    /// body capture.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Values under these keys are stored as `[REDACTED]`.
    #[serde(default = "default_sensitive_keys")]
    pub sensitive_keys: Vec<String>,
}

fn default_max_body_size() -> usize {
    4_096
}
fn default_sensitive_keys() -> Vec<String> {
    DEFAULT_SENSITIVE_KEYS.iter().map(|k| k.to_string()).collect()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_body_size: default_max_body_size(),
            sensitive_keys: default_sensitive_keys(),
        }
    }
}

// ─── Storage / retention / server ────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Sqlite { url: String, max_connections: u32 },
}

/// Background pruning of old records. Disabled when `max_age` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionConfig {
    pub max_age: Option<Duration>,
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: None,
            interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: String,
}

/// Everything the binary needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub server: ServerConfig,
    pub capture: CaptureConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate()?;
        if let StorageConfig::Sqlite { url, .. } = &self.storage {
            if url.trim().is_empty() {
                return Err(ConfigError::MissingDatabaseUrl);
            }
        }
        if self.retention.interval.is_zero() {
            return Err(ConfigError::ZeroRetentionInterval);
        }
        Ok(())
    }
}
