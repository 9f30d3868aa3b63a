use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use esox_leasepool::{FactoryResult, LeasePool, PoolConfiguration, ResourceFactory};

struct NoopEngine;

#[async_trait]
impl ResourceFactory for NoopEngine {
    type Resource = ();
    type Handle = ();

    async fn create_resource(&self) -> FactoryResult<()> {
        Ok(())
    }

    async fn is_alive(&self, _engine: &()) -> bool {
        true
    }

    async fn create_handle(&self, _engine: &()) -> FactoryResult<()> {
        Ok(())
    }

    async fn close_handle(&self, _handle: &()) -> FactoryResult<()> {
        Ok(())
    }

    async fn close_resource(&self, _engine: &()) -> FactoryResult<()> {
        Ok(())
    }
}

fn acquire_release(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let pool = LeasePool::new(NoopEngine, PoolConfiguration::default()).unwrap();

    c.bench_function("acquire_release", |b| {
        b.to_async(&runtime).iter(|| async {
            let lease = pool.acquire().await.unwrap();
            lease.release().await;
        })
    });

    c.bench_function("stats_snapshot", |b| b.iter(|| pool.stats()));
}

criterion_group!(benches, acquire_release);
criterion_main!(benches);
