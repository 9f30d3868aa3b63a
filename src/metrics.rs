//! Stats snapshot and export for lease pools

use crate::shutdown::PoolPhase;
use std::collections::HashMap;

#[cfg(feature = "metrics")]
use crate::errors::{PoolError, PoolResult};

/// Read-only view of a pool at one instant
///
/// # Examples
///
/// ```
/// use esox_leasepool::{PoolPhase, PoolStats};
///
/// let stats = PoolStats {
///     active_requests: 2,
///     queue_depth: 0,
///     max_concurrent: 3,
///     max_queue_size: 50,
///     lease_timeout_ms: 30_000,
///     avg_wait_ms: 0.0,
///     total_processed: 10,
///     total_timed_out: 1,
///     phase: PoolPhase::Running,
/// };
///
/// assert_eq!(stats.export()["active_requests"], "2");
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
#[cfg_attr(feature = "metrics", serde(rename_all = "camelCase"))]
pub struct PoolStats {
    /// Leases currently held
    pub active_requests: usize,

    /// Requests waiting for a lease
    pub queue_depth: usize,

    /// Concurrency limit
    pub max_concurrent: usize,

    /// Wait queue bound
    pub max_queue_size: usize,

    /// Lease timeout in milliseconds
    pub lease_timeout_ms: u64,

    /// Mean queue wait over the recent window
    pub avg_wait_ms: f64,

    /// Leases released by their holders
    pub total_processed: u64,

    /// Leases reclaimed by the lease timer
    pub total_timed_out: u64,

    /// Lifecycle phase
    pub phase: PoolPhase,
}

impl PoolStats {
    /// Fraction of concurrency in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent > 0 {
            self.active_requests as f64 / self.max_concurrent as f64
        } else {
            0.0
        }
    }

    /// Export stats as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("active_requests".to_string(), self.active_requests.to_string());
        metrics.insert("queue_depth".to_string(), self.queue_depth.to_string());
        metrics.insert("max_concurrent".to_string(), self.max_concurrent.to_string());
        metrics.insert("max_queue_size".to_string(), self.max_queue_size.to_string());
        metrics.insert("lease_timeout_ms".to_string(), self.lease_timeout_ms.to_string());
        metrics.insert("avg_wait_ms".to_string(), format!("{:.2}", self.avg_wait_ms));
        metrics.insert("total_processed".to_string(), self.total_processed.to_string());
        metrics.insert("total_timed_out".to_string(), self.total_timed_out.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization()));
        metrics.insert("phase".to_string(), self.phase.as_str().to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export stats in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus any extra `tags`.
    pub fn export_prometheus(
        stats: &PoolStats,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let registry = Registry::new_custom(Some("leasepool".to_string()), Some(labels))
            .map_err(Self::to_pool_error)?;

        let gauges = [
            ("leases_active", "Leases currently held", stats.active_requests as i64),
            ("queue_depth", "Requests waiting for a lease", stats.queue_depth as i64),
            ("max_concurrent", "Concurrency limit", stats.max_concurrent as i64),
            ("max_queue_size", "Wait queue bound", stats.max_queue_size as i64),
            ("lease_timeout_ms", "Lease timeout in milliseconds", stats.lease_timeout_ms as i64),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help).map_err(Self::to_pool_error)?;
            gauge.set(value);
            registry.register(Box::new(gauge)).map_err(Self::to_pool_error)?;
        }

        let avg_wait = Gauge::new("wait_ms_avg", "Mean queue wait over the recent window")
            .map_err(Self::to_pool_error)?;
        avg_wait.set(stats.avg_wait_ms);
        registry.register(Box::new(avg_wait)).map_err(Self::to_pool_error)?;

        let counters = [
            ("leases_processed_total", "Leases released by their holders", stats.total_processed),
            ("leases_timed_out_total", "Leases reclaimed by the lease timer", stats.total_timed_out),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help).map_err(Self::to_pool_error)?;
            counter.inc_by(value);
            registry.register(Box::new(counter)).map_err(Self::to_pool_error)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(Self::to_pool_error)?;
        String::from_utf8(buffer).map_err(|e| PoolError::Metrics(e.to_string()))
    }

    fn to_pool_error(err: prometheus::Error) -> PoolError {
        PoolError::Metrics(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolStats {
        PoolStats {
            active_requests: 3,
            queue_depth: 4,
            max_concurrent: 3,
            max_queue_size: 50,
            lease_timeout_ms: 30_000,
            avg_wait_ms: 125.5,
            total_processed: 42,
            total_timed_out: 2,
            phase: PoolPhase::Running,
        }
    }

    #[test]
    fn test_export_map() {
        let exported = sample().export();
        assert_eq!(exported["queue_depth"], "4");
        assert_eq!(exported["avg_wait_ms"], "125.50");
        assert_eq!(exported["utilization"], "1.00");
        assert_eq!(exported["phase"], "running");
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_export_prometheus() {
        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "render".to_string());

        let output = MetricsExporter::export_prometheus(&sample(), "engine", Some(&tags)).unwrap();

        assert!(output.contains("# TYPE leasepool_leases_active gauge"));
        assert!(output.contains("# TYPE leasepool_leases_timed_out_total counter"));
        assert!(output.contains("pool=\"engine\""));
        assert!(output.contains("service=\"render\""));
        assert!(output
            .lines()
            .any(|line| line.starts_with("leasepool_leases_processed_total{") && line.ends_with(" 42")));
    }
}
