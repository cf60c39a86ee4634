//! Periodic throughput stats
//!
//! A small accumulator owned by whoever constructs it and passed by handle,
//! with reset-on-read semantics: every snapshot drains the counters so each
//! log line covers exactly one interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Count and total duration accumulated since the last snapshot
#[derive(Default)]
pub struct StatsRecorder {
    count: AtomicU64,
    total_micros: AtomicU64,
}

/// One interval's worth of stats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub count: u64,
    pub total: Duration,
}

impl StatsSnapshot {
    /// Average processing time over the interval
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Snapshot and reset the counters
    pub fn take(&self) -> StatsSnapshot {
        StatsSnapshot {
            count: self.count.swap(0, Ordering::Relaxed),
            total: Duration::from_micros(self.total_micros.swap(0, Ordering::Relaxed)),
        }
    }
}

/// Log average throughput once per interval until the task is dropped
pub fn spawn_stats_logger(stats: Arc<StatsRecorder>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let snapshot = stats.take();
            if snapshot.count > 0 {
                info!(
                    count = snapshot.count,
                    avg_ms = snapshot.average().as_secs_f64() * 1000.0,
                    "stats"
                );
            }
        }
    })
}
