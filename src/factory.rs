//! Engine factory abstraction and the owned singleton slot

use crate::errors::{FactoryResult, PoolError, PoolResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Capability the pool uses to manage the underlying engine
///
/// The pool owns exactly one `Resource` at a time and hands out per-lease
/// `Handle`s created from it. A handle must be cheap to clone: the pool keeps
/// one clone so it can force-close the handle when a lease times out, while
/// the caller keeps using its own.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use esox_leasepool::{FactoryResult, ResourceFactory};
///
/// struct Echo;
///
/// #[async_trait]
/// impl ResourceFactory for Echo {
///     type Resource = ();
///     type Handle = u32;
///
///     async fn create_resource(&self) -> FactoryResult<()> { Ok(()) }
///     async fn is_alive(&self, _engine: &()) -> bool { true }
///     async fn create_handle(&self, _engine: &()) -> FactoryResult<u32> { Ok(7) }
///     async fn close_handle(&self, _handle: &u32) -> FactoryResult<()> { Ok(()) }
///     async fn close_resource(&self, _engine: &()) -> FactoryResult<()> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The expensive singleton (e.g. a browser process)
    type Resource: Send + Sync + 'static;

    /// Per-lease handle (e.g. a page or tab)
    type Handle: Clone + Send + Sync + 'static;

    /// Start a fresh engine instance
    async fn create_resource(&self) -> FactoryResult<Self::Resource>;

    /// Whether the engine is still connected and usable
    async fn is_alive(&self, resource: &Self::Resource) -> bool;

    /// Open a per-lease handle on the engine
    async fn create_handle(&self, resource: &Self::Resource) -> FactoryResult<Self::Handle>;

    /// Close a per-lease handle; the pool ignores failures
    async fn close_handle(&self, handle: &Self::Handle) -> FactoryResult<()>;

    /// Tear down the engine; the pool ignores failures
    async fn close_resource(&self, resource: &Self::Resource) -> FactoryResult<()>;
}

/// Lazily created, health-checked holder for the engine singleton
///
/// Creation is serialized by an async mutex so concurrent grants never start
/// two engines. The closed flag lives outside that mutex so shutdown can
/// mark the slot while a launch is still in progress.
pub(crate) struct ResourceSlot<F: ResourceFactory> {
    factory: Arc<F>,
    resource: Mutex<Option<Arc<F::Resource>>>,
    closed: AtomicBool,
    created: AtomicU64,
}

impl<F: ResourceFactory> ResourceSlot<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            resource: Mutex::new(None),
            closed: AtomicBool::new(false),
            created: AtomicU64::new(0),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Number of engine instances started so far
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn released() -> PoolError {
        PoolError::Unavailable("engine has been released".to_string())
    }

    /// Return the live engine, starting or replacing it as needed
    pub async fn get(&self) -> PoolResult<Arc<F::Resource>> {
        if self.is_closed() {
            return Err(Self::released());
        }
        let mut slot = self.resource.lock().await;
        if self.is_closed() {
            return Err(Self::released());
        }

        if let Some(resource) = slot.as_ref().cloned() {
            if self.factory.is_alive(&resource).await {
                return Ok(resource);
            }

            tracing::warn!("engine disconnected, recreating");
            *slot = None;
            if let Err(e) = self.factory.close_resource(&resource).await {
                tracing::debug!(error = %e, "closing disconnected engine failed");
            }
        }

        let resource = self.factory.create_resource().await.map_err(|e| {
            tracing::warn!(error = %e, "engine creation failed");
            PoolError::ResourceCreationFailed(e.to_string())
        })?;

        // shutdown began while the engine was launching
        if self.is_closed() {
            tracing::info!("engine started after release, closing it");
            if let Err(e) = self.factory.close_resource(&resource).await {
                tracing::warn!(error = %e, "engine release failed");
            }
            return Err(Self::released());
        }

        let resource = Arc::new(resource);
        *slot = Some(Arc::clone(&resource));
        let count = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(instances_created = count, "engine started");

        Ok(resource)
    }

    /// Refuse all further [`get`](Self::get) calls without waiting on a launch
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Release the engine; later calls to [`get`](Self::get) fail
    pub async fn close(&self) {
        self.mark_closed();
        let mut slot = self.resource.lock().await;
        if let Some(resource) = slot.take() {
            match self.factory.close_resource(&resource).await {
                Ok(()) => tracing::info!("engine released"),
                Err(e) => tracing::warn!(error = %e, "engine release failed"),
            }
        }
    }
}
