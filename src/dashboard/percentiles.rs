use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// HdrHistogram range: 1 ms → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000;
const HIST_SIGFIG: u8 = 3;

/// Latency distribution (milliseconds) for one dashboard window.
/// All zero when the window is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
}

impl LatencyPercentiles {
    /// Values are clamped into the histogram range, so sub-millisecond
    /// requests count as 1 ms.
    pub fn from_latencies(latencies: impl IntoIterator<Item = i64>) -> Self {
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG) else {
            return Self::default();
        };
        for latency in latencies {
            let v = u64::try_from(latency).unwrap_or(0).clamp(HIST_LOW, HIST_HIGH);
            // in range by construction
            let _ = hist.record(v);
        }
        if hist.len() == 0 {
            return Self::default();
        }

        let at = |q: f64| hist.value_at_quantile(q);
        Self {
            count: hist.len(),
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
            p999: at(0.999),
        }
    }
}
