//! Latency statistics over a sliding window of recent requests.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// Requests remembered per operation.
const WINDOW: usize = 1024;

/// Operation being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Predict,
    Explain,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Predict => f.write_str("predict"),
            Operation::Explain => f.write_str("explain"),
        }
    }
}

/// Percentiles over the current window, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySnapshot {
    pub count: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Default)]
struct Window {
    samples: VecDeque<Duration>,
}

impl Window {
    fn push(&mut self, elapsed: Duration) {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);
    }

    fn snapshot(&self) -> LatencySnapshot {
        let mut sorted: Vec<f64> = self
            .samples
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        if sorted.is_empty() {
            return LatencySnapshot::default();
        }
        sorted.sort_by(f64::total_cmp);

        LatencySnapshot {
            count: sorted.len(),
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
            p99_ms: percentile(&sorted, 0.99),
            max_ms: sorted[sorted.len() - 1],
        }
    }
}

/// Nearest-rank percentile of a sorted, non-empty slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Thread-safe latency recorder.
#[derive(Default)]
pub struct LatencyStats {
    windows: RwLock<HashMap<Operation, Window>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: Operation, elapsed: Duration) {
        self.windows
            .write()
            .entry(operation)
            .or_default()
            .push(elapsed);
    }

    pub fn snapshot(&self, operation: Operation) -> LatencySnapshot {
        self.windows
            .read()
            .get(&operation)
            .map(Window::snapshot)
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        self.windows.write().clear();
    }
}
