//! Core lease pool implementation

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::factory::{ResourceFactory, ResourceSlot};
use crate::health::HealthStatus;
use crate::metrics::PoolStats;
use crate::shutdown::{DrainOutcome, PoolPhase, wait_for_drain};
use crate::telemetry::TelemetryTracker;

#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Lifecycle of a single lease
///
/// `Released` and `Evicted` are terminal; a lease reaches exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Held by the caller
    Active,

    /// Returned by the caller (explicitly or on drop)
    Released,

    /// Reclaimed by the lease timer; the handle has been closed
    Evicted,
}

struct LeaseStatus(AtomicU8);

impl LeaseStatus {
    const ACTIVE: u8 = 0;
    const RELEASED: u8 = 1;
    const EVICTED: u8 = 2;

    fn new() -> Self {
        Self(AtomicU8::new(Self::ACTIVE))
    }

    fn get(&self) -> LeaseState {
        match self.0.load(Ordering::Acquire) {
            Self::ACTIVE => LeaseState::Active,
            Self::RELEASED => LeaseState::Released,
            _ => LeaseState::Evicted,
        }
    }

    /// Move out of `Active`; returns false if the lease already settled
    fn settle(&self, outcome: LeaseState) -> bool {
        let code = match outcome {
            LeaseState::Active => return false,
            LeaseState::Released => Self::RELEASED,
            LeaseState::Evicted => Self::EVICTED,
        };
        self.0
            .compare_exchange(Self::ACTIVE, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

type Completion<F> = oneshot::Sender<PoolResult<Lease<F>>>;

struct PendingRequest<F: ResourceFactory> {
    enqueued_at: Instant,
    completion: Completion<F>,
}

struct ActiveLease<F: ResourceFactory> {
    handle: F::Handle,
    status: Arc<LeaseStatus>,
    watchdog: AbortHandle,
}

/// Everything admission decisions read or write, behind one lock
struct AdmissionState<F: ResourceFactory> {
    phase: PoolPhase,
    active: usize,
    queue: VecDeque<PendingRequest<F>>,
    leases: HashMap<u64, ActiveLease<F>>,
    next_lease_id: u64,
}

enum Admission<F: ResourceFactory> {
    Granted,
    Queued(oneshot::Receiver<PoolResult<Lease<F>>>),
}

struct PoolInner<F: ResourceFactory> {
    config: PoolConfiguration,
    slot: ResourceSlot<F>,
    state: Mutex<AdmissionState<F>>,
    telemetry: TelemetryTracker,
    runtime: RuntimeHandle,
    closed: watch::Sender<bool>,
}

/// A reserved unit of capacity that is handed back unless converted into a lease
struct Reservation<F: ResourceFactory> {
    pool: Option<Arc<PoolInner<F>>>,
}

impl<F: ResourceFactory> Reservation<F> {
    fn disarm(mut self) {
        self.pool = None;
    }
}

impl<F: ResourceFactory> Drop for Reservation<F> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.rollback_reservation();
        }
    }
}

impl<F: ResourceFactory> PoolInner<F> {
    fn admit(&self) -> PoolResult<Admission<F>> {
        let mut state = self.state.lock();

        if !state.phase.is_running() {
            return Err(PoolError::Unavailable(format!("pool is {}", state.phase.as_str())));
        }

        if state.active < self.config.max_concurrent {
            state.active += 1;
            return Ok(Admission::Granted);
        }

        let queue_depth = state.queue.len();
        if queue_depth >= self.config.max_queue_size {
            let estimated_wait_ms = self.telemetry.estimate_wait_ms(
                queue_depth,
                self.config.max_concurrent,
                self.config.lease_timeout,
            );
            tracing::warn!(queue_depth, estimated_wait_ms, "wait queue full, rejecting request");
            return Err(PoolError::ResourceExhausted { estimated_wait_ms });
        }

        let (completion, receiver) = oneshot::channel();
        state.queue.push_back(PendingRequest {
            enqueued_at: Instant::now(),
            completion,
        });
        tracing::debug!(queue_depth = queue_depth + 1, "request queued");

        Ok(Admission::Queued(receiver))
    }

    /// Turn an already reserved slot into a lease
    async fn grant(self: &Arc<Self>) -> PoolResult<Lease<F>> {
        let reservation = Reservation {
            pool: Some(Arc::clone(self)),
        };

        let resource = self.slot.get().await?;
        let handle = self
            .slot
            .factory()
            .create_handle(&resource)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "handle creation failed");
                PoolError::ResourceCreationFailed(e.to_string())
            })?;

        match self.register(reservation, handle.clone()) {
            Some(lease) => Ok(lease),
            None => {
                self.close_handle(&handle).await;
                Err(PoolError::Unavailable("pool is shutting down".to_string()))
            }
        }
    }

    fn register(self: &Arc<Self>, reservation: Reservation<F>, handle: F::Handle) -> Option<Lease<F>> {
        let mut state = self.state.lock();
        if !state.phase.is_running() {
            drop(state);
            drop(reservation);
            return None;
        }
        reservation.disarm();

        let id = state.next_lease_id;
        state.next_lease_id += 1;

        let status = Arc::new(LeaseStatus::new());
        let watchdog = self.spawn_watchdog(id);
        state.leases.insert(
            id,
            ActiveLease {
                handle: handle.clone(),
                status: Arc::clone(&status),
                watchdog,
            },
        );
        tracing::debug!(lease_id = id, active = state.active, "lease granted");

        Some(Lease {
            id,
            handle,
            status,
            granted_at: Instant::now(),
            pool: Arc::clone(self),
        })
    }

    fn spawn_watchdog(self: &Arc<Self>, id: u64) -> AbortHandle {
        let pool = Arc::downgrade(self);
        let timeout = self.config.lease_timeout;
        self.runtime
            .spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(pool) = pool.upgrade() {
                    pool.evict(id).await;
                }
            })
            .abort_handle()
    }

    fn rollback_reservation(self: &Arc<Self>) {
        let promotions = {
            let mut state = self.state.lock();
            state.active -= 1;
            self.take_promotions(&mut state)
        };
        self.dispatch(promotions);
    }

    /// Settle a lease and free its slot; `None` if it had already settled
    fn finish_lease(self: &Arc<Self>, id: u64, outcome: LeaseState) -> Option<F::Handle> {
        let (entry, promotions) = {
            let mut state = self.state.lock();
            let entry = state.leases.remove(&id)?;
            entry.status.settle(outcome);
            state.active -= 1;
            let promotions = self.take_promotions(&mut state);
            (entry, promotions)
        };

        if outcome == LeaseState::Evicted {
            self.telemetry.increment_timed_out();
        } else {
            entry.watchdog.abort();
            self.telemetry.increment_processed();
        }

        self.dispatch(promotions);
        Some(entry.handle)
    }

    /// Reserve capacity for queued requests in FIFO order
    fn take_promotions(&self, state: &mut AdmissionState<F>) -> Vec<Completion<F>> {
        let mut promotions = Vec::new();
        if !state.phase.is_running() {
            return promotions;
        }

        while state.active < self.config.max_concurrent {
            let Some(pending) = state.queue.pop_front() else {
                break;
            };
            if pending.completion.is_closed() {
                continue;
            }
            state.active += 1;
            self.telemetry.record_wait(pending.enqueued_at.elapsed());
            promotions.push(pending.completion);
        }

        promotions
    }

    fn dispatch(self: &Arc<Self>, promotions: Vec<Completion<F>>) {
        for completion in promotions {
            let pool = Arc::clone(self);
            self.runtime.spawn(async move {
                let result = pool.grant().await;
                if let Err(Ok(lease)) = completion.send(result) {
                    lease.release().await;
                }
            });
        }
    }

    async fn release(self: &Arc<Self>, id: u64) {
        if let Some(handle) = self.finish_lease(id, LeaseState::Released) {
            tracing::debug!(lease_id = id, "lease released");
            self.close_handle(&handle).await;
        }
    }

    async fn evict(self: Arc<Self>, id: u64) {
        if let Some(handle) = self.finish_lease(id, LeaseState::Evicted) {
            tracing::warn!(
                lease_id = id,
                timeout_ms = self.config.lease_timeout.as_millis() as u64,
                "lease exceeded timeout, reclaiming"
            );
            self.close_handle(&handle).await;
        }
    }

    async fn close_handle(&self, handle: &F::Handle) {
        if let Err(e) = self.slot.factory().close_handle(handle).await {
            tracing::debug!(error = %e, "closing lease handle failed");
        }
    }

    fn active(&self) -> usize {
        self.state.lock().active
    }
}

/// An exclusive, time-bounded right to use one handle on the engine
///
/// Dereferences to the handle. Release it with [`Lease::release`]; a lease
/// that is dropped while still active is released automatically. Once the
/// lease timeout passes the pool closes the handle on its own and the lease
/// reports [`LeaseState::Evicted`].
pub struct Lease<F: ResourceFactory> {
    id: u64,
    handle: F::Handle,
    status: Arc<LeaseStatus>,
    granted_at: Instant,
    pool: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Lease<F> {
    /// Pool-unique identifier of this lease
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The per-lease handle
    pub fn handle(&self) -> &F::Handle {
        &self.handle
    }

    /// Current lifecycle state
    pub fn state(&self) -> LeaseState {
        self.status.get()
    }

    /// Time since the lease was granted
    pub fn held_for(&self) -> Duration {
        self.granted_at.elapsed()
    }

    /// Return the lease to the pool; later calls do nothing
    pub async fn release(&self) {
        if self.state() == LeaseState::Active {
            self.pool.release(self.id).await;
        }
    }
}

impl<F: ResourceFactory> Deref for Lease<F> {
    type Target = F::Handle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<F: ResourceFactory> Drop for Lease<F> {
    fn drop(&mut self) {
        if self.state() != LeaseState::Active {
            return;
        }
        if let Some(handle) = self.pool.finish_lease(self.id, LeaseState::Released) {
            tracing::debug!(lease_id = self.id, "lease dropped without release");
            let pool = Arc::clone(&self.pool);
            self.pool.runtime.spawn(async move {
                pool.close_handle(&handle).await;
            });
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for Lease<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Bounded-concurrency pool guarding a single engine instance
///
/// Cloning is cheap; all clones share the same engine, queue and counters.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use esox_leasepool::{FactoryResult, LeasePool, PoolConfiguration, ResourceFactory};
///
/// struct Engine;
///
/// #[async_trait]
/// impl ResourceFactory for Engine {
///     type Resource = ();
///     type Handle = &'static str;
///
///     async fn create_resource(&self) -> FactoryResult<()> { Ok(()) }
///     async fn is_alive(&self, _engine: &()) -> bool { true }
///     async fn create_handle(&self, _engine: &()) -> FactoryResult<&'static str> { Ok("tab") }
///     async fn close_handle(&self, _handle: &&'static str) -> FactoryResult<()> { Ok(()) }
///     async fn close_resource(&self, _engine: &()) -> FactoryResult<()> { Ok(()) }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = LeasePool::new(Engine, PoolConfiguration::default()).unwrap();
/// {
///     let lease = pool.acquire().await.unwrap();
///     assert_eq!(*lease, "tab");
///     lease.release().await;
/// }
/// assert_eq!(pool.stats().total_processed, 1);
/// pool.shutdown().await;
/// # }
/// ```
pub struct LeasePool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for LeasePool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> LeasePool<F> {
    /// Create a pool; must be called from within a Tokio runtime
    pub fn new(factory: F, config: PoolConfiguration) -> PoolResult<Self> {
        config.validate()?;
        let runtime = RuntimeHandle::try_current().map_err(|_| {
            PoolError::InvalidConfiguration("lease pool must be created inside a Tokio runtime".to_string())
        })?;

        let telemetry = TelemetryTracker::new(config.wait_window);
        let state = AdmissionState {
            phase: PoolPhase::Running,
            active: 0,
            queue: VecDeque::with_capacity(config.max_queue_size),
            leases: HashMap::with_capacity(config.max_concurrent),
            next_lease_id: 1,
        };

        tracing::debug!(
            max_concurrent = config.max_concurrent,
            max_queue_size = config.max_queue_size,
            lease_timeout_ms = config.lease_timeout.as_millis() as u64,
            "lease pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                slot: ResourceSlot::new(Arc::new(factory)),
                state: Mutex::new(state),
                telemetry,
                runtime,
                closed: watch::channel(false).0,
                config,
            }),
        })
    }

    /// Acquire a lease, waiting in the FIFO queue if every slot is taken
    ///
    /// Fails immediately with [`PoolError::ResourceExhausted`] when the queue is
    /// full and with [`PoolError::Unavailable`] once shutdown has begun; a
    /// queued request is also rejected with `Unavailable` if shutdown starts
    /// while it waits.
    pub async fn acquire(&self) -> PoolResult<Lease<F>> {
        match self.inner.admit()? {
            Admission::Granted => self.inner.grant().await,
            Admission::Queued(receiver) => receiver.await.unwrap_or_else(|_| {
                Err(PoolError::Unavailable("pool dropped pending request".to_string()))
            }),
        }
    }

    /// Run `op` with a leased handle, releasing the lease afterwards
    pub async fn with_lease<T, Op, Fut>(&self, op: Op) -> PoolResult<T>
    where
        Op: FnOnce(F::Handle) -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.acquire().await?;
        let output = op(lease.handle().clone()).await;
        lease.release().await;
        Ok(output)
    }

    /// Start the engine ahead of the first request
    pub async fn warmup(&self) -> PoolResult<()> {
        if !self.phase().is_running() {
            return Err(PoolError::Unavailable("pool is not running".to_string()));
        }
        self.inner.slot.get().await.map(|_| ())
    }

    /// Drain and close the pool
    ///
    /// Rejects every queued request, waits up to lease timeout plus the
    /// shutdown grace for active leases, then releases the engine within
    /// whatever is left of that deadline. Leases still active at the deadline
    /// are abandoned. Concurrent or repeated calls resolve once the pool is
    /// closed.
    pub async fn shutdown(&self) {
        let pending = {
            let mut state = self.inner.state.lock();
            if !state.phase.is_running() {
                None
            } else {
                state.phase = PoolPhase::Draining;
                Some(std::mem::take(&mut state.queue))
            }
        };
        let Some(pending) = pending else {
            let mut closed = self.inner.closed.subscribe();
            let _ = closed.wait_for(|closed| *closed).await;
            return;
        };

        tracing::info!(rejected = pending.len(), "lease pool draining");
        for request in pending {
            let _ = request
                .completion
                .send(Err(PoolError::Unavailable("pool is shutting down".to_string())));
        }

        let inner = &self.inner;
        let give_up_at = Instant::now() + inner.config.drain_deadline();
        let outcome = wait_for_drain(
            || inner.active(),
            inner.config.drain_deadline(),
            inner.config.drain_poll_interval,
        )
        .await;
        match outcome {
            DrainOutcome::Drained => tracing::info!("all leases returned"),
            DrainOutcome::Abandoned { remaining } => {
                tracing::warn!(remaining, "drain deadline elapsed, abandoning active leases")
            }
        }

        inner.slot.mark_closed();
        let remaining = give_up_at.saturating_duration_since(Instant::now());
        if tokio::time::timeout(remaining, inner.slot.close()).await.is_err() {
            tracing::warn!("engine still launching at drain deadline, it will be closed once started");
        }

        inner.state.lock().phase = PoolPhase::Closed;
        inner.closed.send_replace(true);
        tracing::info!("lease pool closed");
    }

    /// Read-only snapshot for health and metrics endpoints
    pub fn stats(&self) -> PoolStats {
        let (active, queue_depth, phase) = {
            let state = self.inner.state.lock();
            (state.active, state.queue.len(), state.phase)
        };
        let config = &self.inner.config;
        let telemetry = &self.inner.telemetry;

        PoolStats {
            active_requests: active,
            queue_depth,
            max_concurrent: config.max_concurrent,
            max_queue_size: config.max_queue_size,
            lease_timeout_ms: config.lease_timeout.as_millis() as u64,
            avg_wait_ms: telemetry.average_wait_ms(),
            total_processed: telemetry.processed(),
            total_timed_out: telemetry.timed_out(),
            phase,
        }
    }

    /// Advisory wait for a request arriving now
    pub fn estimated_wait_ms(&self) -> u64 {
        let queue_depth = self.queue_depth();
        self.inner.telemetry.estimate_wait_ms(
            queue_depth,
            self.inner.config.max_concurrent,
            self.inner.config.lease_timeout,
        )
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::from_stats(&self.stats())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.stats().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        MetricsExporter::export_prometheus(&self.stats(), pool_name, tags)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> PoolPhase {
        self.inner.state.lock().phase
    }

    /// Leases currently held (including grants still opening their handle)
    pub fn active_count(&self) -> usize {
        self.inner.active()
    }

    /// Requests waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Number of engine instances started over the pool's lifetime
    pub fn engines_started(&self) -> u64 {
        self.inner.slot.created_count()
    }

    /// Configuration the pool was built with
    pub fn config(&self) -> &PoolConfiguration {
        &self.inner.config
    }
}
