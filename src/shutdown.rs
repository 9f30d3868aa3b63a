//! Shutdown phases and the drain wait

use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle phase of a pool; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub enum PoolPhase {
    /// Accepting and granting leases
    Running,

    /// Shutdown started; queue rejected, waiting for active leases
    Draining,

    /// Engine released; every acquire fails
    Closed,
}

impl PoolPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolPhase::Running => "running",
            PoolPhase::Draining => "draining",
            PoolPhase::Closed => "closed",
        }
    }

    pub fn is_running(&self) -> bool {
        *self == PoolPhase::Running
    }
}

/// How the drain wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    Drained,
    Abandoned { remaining: usize },
}

/// Poll `active` until it reports zero or `deadline` elapses
pub(crate) async fn wait_for_drain<A>(active: A, deadline: Duration, poll: Duration) -> DrainOutcome
where
    A: Fn() -> usize,
{
    let give_up_at = Instant::now() + deadline;
    loop {
        let remaining = active();
        if remaining == 0 {
            return DrainOutcome::Drained;
        }
        let now = Instant::now();
        if now >= give_up_at {
            return DrainOutcome::Abandoned { remaining };
        }
        tokio::time::sleep(poll.min(give_up_at - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_drain_returns_immediately_when_idle() {
        let started = Instant::now();
        let outcome = wait_for_drain(|| 0, Duration::from_secs(60), Duration::from_millis(100)).await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_active_to_reach_zero() {
        let active = Arc::new(AtomicUsize::new(2));
        let counter = Arc::clone(&active);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            counter.store(0, Ordering::SeqCst);
        });

        let started = Instant::now();
        let outcome = wait_for_drain(
            || active.load(Ordering::SeqCst),
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(outcome, DrainOutcome::Drained);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_abandons_after_deadline() {
        let started = Instant::now();
        let outcome = wait_for_drain(|| 1, Duration::from_millis(350), Duration::from_millis(100)).await;
        assert_eq!(outcome, DrainOutcome::Abandoned { remaining: 1 });
        assert!(started.elapsed() >= Duration::from_millis(350));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(PoolPhase::Running.as_str(), "running");
        assert!(PoolPhase::Running.is_running());
        assert!(!PoolPhase::Closed.is_running());
    }
}
