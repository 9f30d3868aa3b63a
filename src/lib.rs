//! # Esox LeasePool
//!
//! Bounded-concurrency lease pool guarding one expensive, long-lived engine
//! instance (for example a headless browser) that serves many short,
//! variable-latency requests.
//!
//! ## Features
//!
//! - Lazily created engine singleton, health-checked and recreated on disconnect
//! - Fixed concurrency limit with strict FIFO wait queue
//! - Backpressure: a full queue rejects immediately with a wait estimate
//! - Per-lease timeout that reclaims handles from stuck callers
//! - Automatic release of leases via RAII (Drop trait)
//! - Rolling wait-time telemetry, health status and Prometheus export
//! - Graceful drain shutdown bounded by lease timeout plus grace period
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use esox_leasepool::{FactoryResult, LeasePool, PoolConfiguration, PoolError, ResourceFactory};
//!
//! struct Browser;
//!
//! #[async_trait]
//! impl ResourceFactory for Browser {
//!     type Resource = ();
//!     type Handle = u32;
//!
//!     async fn create_resource(&self) -> FactoryResult<()> { Ok(()) }
//!     async fn is_alive(&self, _browser: &()) -> bool { true }
//!     async fn create_handle(&self, _browser: &()) -> FactoryResult<u32> { Ok(1) }
//!     async fn close_handle(&self, _tab: &u32) -> FactoryResult<()> { Ok(()) }
//!     async fn close_resource(&self, _browser: &()) -> FactoryResult<()> { Ok(()) }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = LeasePool::new(Browser, PoolConfiguration::default()).unwrap();
//!
//! match pool.acquire().await {
//!     Ok(tab) => {
//!         println!("rendering with tab {}", *tab);
//!         tab.release().await;
//!     }
//!     Err(e @ PoolError::ResourceExhausted { .. }) => println!("503: {}", e.wait_hint()),
//!     Err(e) => println!("503: {}", e),
//! }
//!
//! pool.shutdown().await;
//! # }
//! ```

mod pool;
mod config;
mod factory;
mod telemetry;
mod shutdown;
mod metrics;
mod health;
mod errors;

pub use pool::{LeasePool, Lease, LeaseState};
pub use config::PoolConfiguration;
pub use factory::ResourceFactory;
pub use shutdown::PoolPhase;
pub use metrics::PoolStats;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use health::HealthStatus;
pub use errors::{FactoryError, FactoryResult, PoolError, PoolResult};
