//! Wait-time telemetry and cumulative lease counters

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Rolling window of recent queue waits plus lifetime counters
///
/// Lives outside the admission lock so stats readers never contend with
/// grant and release paths for longer than a window read.
pub(crate) struct TelemetryTracker {
    waits: Mutex<VecDeque<u64>>,
    capacity: usize,
    total_processed: AtomicU64,
    total_timed_out: AtomicU64,
}

impl TelemetryTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            waits: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            total_processed: AtomicU64::new(0),
            total_timed_out: AtomicU64::new(0),
        }
    }

    /// Record how long a promoted request sat in the queue
    pub fn record_wait(&self, wait: Duration) {
        let mut waits = self.waits.lock();
        waits.push_back(wait.as_millis() as u64);
        while waits.len() > self.capacity {
            waits.pop_front();
        }
    }

    /// Mean of the current window, 0 when empty
    pub fn average_wait_ms(&self) -> f64 {
        self.window_average().unwrap_or(0.0)
    }

    /// Advisory wait estimate for a request arriving behind `queue_depth` others
    pub fn estimate_wait_ms(
        &self,
        queue_depth: usize,
        max_concurrent: usize,
        lease_timeout: Duration,
    ) -> u64 {
        estimate_wait_ms(self.window_average(), queue_depth, max_concurrent, lease_timeout)
    }

    #[cfg(test)]
    pub fn sample_count(&self) -> usize {
        self.waits.lock().len()
    }

    fn window_average(&self) -> Option<f64> {
        let waits = self.waits.lock();
        if waits.is_empty() {
            return None;
        }
        let sum: u64 = waits.iter().sum();
        Some(sum as f64 / waits.len() as f64)
    }

    pub fn increment_processed(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timed_out(&self) {
        self.total_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.total_processed.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.total_timed_out.load(Ordering::Relaxed)
    }
}

/// Without samples, assume each queued slot costs half a lease timeout;
/// with samples, scale the observed average by the number of queue "rounds".
pub(crate) fn estimate_wait_ms(
    average_ms: Option<f64>,
    queue_depth: usize,
    max_concurrent: usize,
    lease_timeout: Duration,
) -> u64 {
    let rounds = queue_depth as f64 / max_concurrent.max(1) as f64;
    let estimate = match average_ms {
        None => rounds * (lease_timeout.as_millis() as f64 / 2.0),
        Some(avg) => avg * (rounds + 1.0),
    };
    estimate.max(0.0).round() as u64
}
