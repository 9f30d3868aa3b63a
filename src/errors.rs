//! Error types for the lease pool

use std::time::Duration;
use thiserror::Error;

/// Error produced by a [`ResourceFactory`](crate::ResourceFactory) implementation
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// Result type used by factory implementations
pub type FactoryResult<T> = Result<T, FactoryError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool is unavailable: {0}")]
    Unavailable(String),

    #[error("Wait queue is full - estimated wait {estimated_wait_ms} ms")]
    ResourceExhausted { estimated_wait_ms: u64 },

    #[error("Failed to create engine resource: {0}")]
    ResourceCreationFailed(String),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Metrics export failed: {0}")]
    Metrics(String),
}

impl PoolError {
    /// Whether the caller may retry the same request later with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::ResourceExhausted { .. } | PoolError::ResourceCreationFailed(_)
        )
    }

    /// Suggested delay before retrying, if the error carries one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PoolError::ResourceExhausted { estimated_wait_ms } => {
                Some(Duration::from_millis(*estimated_wait_ms))
            }
            _ => None,
        }
    }

    /// Human-readable hint suitable for a 503 response body
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_leasepool::PoolError;
    ///
    /// let err = PoolError::ResourceExhausted { estimated_wait_ms: 4200 };
    /// assert_eq!(err.wait_hint(), "Server busy, please retry in about 5 seconds");
    /// ```
    pub fn wait_hint(&self) -> String {
        match self {
            PoolError::ResourceExhausted { estimated_wait_ms } => {
                let seconds = estimated_wait_ms.div_ceil(1000).max(1);
                format!(
                    "Server busy, please retry in about {} second{}",
                    seconds,
                    if seconds == 1 { "" } else { "s" }
                )
            }
            PoolError::Unavailable(_) => "Service is shutting down".to_string(),
            PoolError::ResourceCreationFailed(_) => {
                "Rendering engine unavailable, please retry shortly".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PoolError::ResourceExhausted { estimated_wait_ms: 10 }.is_retryable());
        assert!(PoolError::ResourceCreationFailed("boom".into()).is_retryable());
        assert!(!PoolError::Unavailable("closed".into()).is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_exhaustion() {
        let err = PoolError::ResourceExhausted { estimated_wait_ms: 1500 };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(PoolError::Unavailable("closed".into()).retry_after(), None);
    }

    #[test]
    fn test_wait_hint_rounds_up_to_one_second() {
        let err = PoolError::ResourceExhausted { estimated_wait_ms: 0 };
        assert_eq!(err.wait_hint(), "Server busy, please retry in about 1 second");
        assert_eq!(
            PoolError::Unavailable("draining".into()).wait_hint(),
            "Service is shutting down"
        );
    }
}
