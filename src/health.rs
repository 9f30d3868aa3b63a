//! Health monitoring for lease pools

use crate::metrics::PoolStats;
use crate::shutdown::PoolPhase;

/// Health status of a lease pool, suitable for a readiness endpoint
///
/// # Examples
///
/// ```
/// use esox_leasepool::{HealthStatus, PoolPhase, PoolStats};
///
/// let stats = PoolStats {
///     active_requests: 1,
///     queue_depth: 0,
///     max_concurrent: 3,
///     max_queue_size: 50,
///     lease_timeout_ms: 30_000,
///     avg_wait_ms: 0.0,
///     total_processed: 0,
///     total_timed_out: 0,
///     phase: PoolPhase::Running,
/// };
///
/// let health = HealthStatus::from_stats(&stats);
/// assert!(health.is_healthy());
/// assert!(health.warnings.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current utilization of the concurrency limit (0.0 to 1.0)
    pub utilization: f64,

    /// Fill level of the wait queue (0.0 to 1.0)
    pub queue_saturation: f64,

    /// Lifecycle phase
    pub phase: PoolPhase,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Derive health from a stats snapshot
    pub fn from_stats(stats: &PoolStats) -> Self {
        let utilization = stats.utilization();
        let queue_saturation = if stats.max_queue_size > 0 {
            stats.queue_depth as f64 / stats.max_queue_size as f64
        } else if stats.active_requests >= stats.max_concurrent {
            // no queue: any further request is rejected
            1.0
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if !stats.phase.is_running() {
            warnings.push(format!("Pool is {}", stats.phase.as_str()));
            is_healthy = false;
        }

        if queue_saturation >= 0.9 {
            warnings.push(format!("Wait queue saturated: {:.1}%", queue_saturation * 100.0));
            is_healthy = false;
        }

        if utilization >= 1.0 {
            warnings.push("All leases in use".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            queue_saturation,
            phase: stats.phase,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(active: usize, queued: usize, max_queue: usize, phase: PoolPhase) -> PoolStats {
        PoolStats {
            active_requests: active,
            queue_depth: queued,
            max_concurrent: 2,
            max_queue_size: max_queue,
            lease_timeout_ms: 1000,
            avg_wait_ms: 0.0,
            total_processed: 0,
            total_timed_out: 0,
            phase,
        }
    }

    #[test]
    fn test_full_utilization_is_warning_only() {
        let health = HealthStatus::from_stats(&stats(2, 1, 10, PoolPhase::Running));
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 1);
    }

    #[test]
    fn test_saturated_queue_is_unhealthy() {
        let health = HealthStatus::from_stats(&stats(2, 9, 10, PoolPhase::Running));
        assert!(!health.is_healthy());
        assert!(health.warnings.iter().any(|w| w.starts_with("Wait queue saturated")));
    }

    #[test]
    fn test_zero_queue_full_capacity_is_saturated() {
        let health = HealthStatus::from_stats(&stats(2, 0, 0, PoolPhase::Running));
        assert_eq!(health.queue_saturation, 1.0);
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_draining_is_unhealthy() {
        let health = HealthStatus::from_stats(&stats(0, 0, 10, PoolPhase::Draining));
        assert!(!health.is_healthy());
        assert_eq!(health.warnings, vec!["Pool is draining".to_string()]);
    }
}
