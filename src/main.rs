// Esox LeasePool - demo binary
// Serves a burst of simulated render requests through a pool guarding one
// fake engine. Tune with LEASEPOOL_* variables and RUST_LOG.

use async_trait::async_trait;
use esox_leasepool::{FactoryResult, LeasePool, PoolConfiguration, PoolError, ResourceFactory};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Stand-in for a headless browser process
struct SimulatedEngine {
    next_tab: AtomicU64,
}

#[async_trait]
impl ResourceFactory for SimulatedEngine {
    type Resource = ();
    type Handle = u64;

    async fn create_resource(&self) -> FactoryResult<()> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    async fn is_alive(&self, _engine: &()) -> bool {
        true
    }

    async fn create_handle(&self, _engine: &()) -> FactoryResult<u64> {
        Ok(self.next_tab.fetch_add(1, Ordering::Relaxed))
    }

    async fn close_handle(&self, _tab: &u64) -> FactoryResult<()> {
        Ok(())
    }

    async fn close_resource(&self, _engine: &()) -> FactoryResult<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), PoolError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("esox_leasepool=debug,info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = PoolConfiguration::from_env();
    info!(
        max_concurrent = config.max_concurrent,
        max_queue_size = config.max_queue_size,
        "Starting Esox LeasePool demo v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = LeasePool::new(
        SimulatedEngine {
            next_tab: AtomicU64::new(1),
        },
        config,
    )?;
    pool.warmup().await?;

    let served = Arc::new(AtomicU64::new(0));
    let mut requests = Vec::new();
    for request in 0..80u64 {
        let pool = pool.clone();
        let served = Arc::clone(&served);
        requests.push(tokio::spawn(async move {
            let result = pool
                .with_lease(|tab| async move {
                    tokio::time::sleep(Duration::from_millis(20 + (request * 7) % 60)).await;
                    tab
                })
                .await;
            match result {
                Ok(tab) => {
                    served.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(request, tab, "render complete");
                }
                Err(e) => info!(request, "rejected: {}", e.wait_hint()),
            }
        }));
    }

    for request in requests {
        let _ = request.await;
    }

    let stats = pool.stats();
    info!(
        served = served.load(Ordering::Relaxed),
        avg_wait_ms = stats.avg_wait_ms,
        timed_out = stats.total_timed_out,
        "burst finished"
    );

    pool.shutdown().await;
    Ok(())
}
