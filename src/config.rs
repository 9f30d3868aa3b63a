//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

/// Configuration for lease pool behavior
///
/// All values are fixed once the pool is constructed.
///
/// # Examples
///
/// ```
/// use esox_leasepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_concurrent(4)
///     .with_max_queue_size(20)
///     .with_lease_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.max_concurrent, 4);
/// assert_eq!(config.max_queue_size, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration {
    /// Maximum number of leases that may be outstanding simultaneously
    pub max_concurrent: usize,

    /// Maximum number of requests waiting for a lease; 0 disables queuing
    pub max_queue_size: usize,

    /// How long a lease may be held before it is forcibly reclaimed
    pub lease_timeout: Duration,

    /// Extra time granted to active leases during shutdown, on top of the lease timeout
    pub shutdown_grace: Duration,

    /// How often shutdown re-checks the active lease count while draining
    pub drain_poll_interval: Duration,

    /// Number of recent wait samples kept for averaging
    pub wait_window: usize,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_queue_size: 50,
            lease_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            drain_poll_interval: Duration::from_millis(100),
            wait_window: 100,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrent leases
    pub fn with_max_concurrent(mut self, count: usize) -> Self {
        self.max_concurrent = count;
        self
    }

    /// Set the wait queue bound
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Set the lease timeout
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the drain poll interval
    pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    /// Set the wait sample window size
    pub fn with_wait_window(mut self, size: usize) -> Self {
        self.wait_window = size;
        self
    }

    /// Upper bound on how long shutdown waits for active leases
    pub fn drain_deadline(&self) -> Duration {
        self.lease_timeout + self.shutdown_grace
    }

    /// Check the configuration for values the pool cannot run with
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_concurrent == 0 {
            return Err(PoolError::InvalidConfiguration(
                "max_concurrent must be greater than zero".to_string(),
            ));
        }
        if self.lease_timeout.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "lease_timeout must be greater than zero".to_string(),
            ));
        }
        if self.wait_window == 0 {
            return Err(PoolError::InvalidConfiguration(
                "wait_window must be greater than zero".to_string(),
            ));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "drain_poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config from environment variables
    ///
    /// Recognized variables: `LEASEPOOL_MAX_CONCURRENT`, `LEASEPOOL_MAX_QUEUE_SIZE`,
    /// `LEASEPOOL_LEASE_TIMEOUT_MS` and `LEASEPOOL_SHUTDOWN_GRACE_MS`. Values that
    /// fail to parse leave the default in place.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let parse = |key: &str| lookup(key).and_then(|val| val.trim().parse::<u64>().ok());

        if let Some(n) = parse("LEASEPOOL_MAX_CONCURRENT") {
            config.max_concurrent = n as usize;
        }
        if let Some(n) = parse("LEASEPOOL_MAX_QUEUE_SIZE") {
            config.max_queue_size = n as usize;
        }
        if let Some(ms) = parse("LEASEPOOL_LEASE_TIMEOUT_MS") {
            config.lease_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse("LEASEPOOL_SHUTDOWN_GRACE_MS") {
            config.shutdown_grace = Duration::from_millis(ms);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PoolConfiguration::default();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.max_queue_size, 50);
        assert_eq!(config.lease_timeout, Duration::from_millis(30_000));
        assert_eq!(config.wait_window, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let err = PoolConfiguration::new().with_max_concurrent(0).validate();
        assert!(matches!(err, Err(PoolError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let err = PoolConfiguration::new()
            .with_lease_timeout(Duration::ZERO)
            .validate();
        assert!(matches!(err, Err(PoolError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_zero_queue_is_valid() {
        assert!(PoolConfiguration::new().with_max_queue_size(0).validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("LEASEPOOL_MAX_CONCURRENT", "8"),
            ("LEASEPOOL_MAX_QUEUE_SIZE", "not-a-number"),
            ("LEASEPOOL_LEASE_TIMEOUT_MS", " 1500 "),
        ]
        .into_iter()
        .collect();

        let config = PoolConfiguration::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.max_queue_size, 50);
        assert_eq!(config.lease_timeout, Duration::from_millis(1500));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_drain_deadline() {
        let config = PoolConfiguration::new()
            .with_lease_timeout(Duration::from_millis(100))
            .with_shutdown_grace(Duration::from_millis(50));
        assert_eq!(config.drain_deadline(), Duration::from_millis(150));
    }
}
