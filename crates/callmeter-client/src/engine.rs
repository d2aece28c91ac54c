//! The HTTP engine surface the instrumentation attaches to.
//!
//! An engine owns a single lifecycle-observer slot, the executor its
//! asynchronous calls run on, a connection pool, a dispatcher, and
//! optionally a response cache. Pool, dispatcher and cache are exposed as
//! shared stats handles so gauges can read them without holding the engine.

use std::io;
use std::sync::Arc;

use callmeter_core::LifecycleObserver;

use crate::executor::TaskExecutor;

pub trait HttpEngine: Send + Sync + 'static {
    /// Observer currently installed in the engine's single slot.
    fn event_observer(&self) -> Option<Arc<dyn LifecycleObserver>>;

    fn set_event_observer(&mut self, observer: Option<Arc<dyn LifecycleObserver>>);

    /// Executor asynchronous calls are dispatched through.
    fn executor(&self) -> Arc<dyn TaskExecutor>;

    fn set_executor(&mut self, executor: Arc<dyn TaskExecutor>);

    fn connection_pool(&self) -> Arc<dyn PoolStats>;

    fn dispatcher(&self) -> Arc<dyn DispatcherStats>;

    fn cache(&self) -> Option<Arc<dyn CacheStats>>;

    fn queued_calls(&self) -> usize {
        self.dispatcher().queued_calls()
    }

    fn running_calls(&self) -> usize {
        self.dispatcher().running_calls()
    }
}

pub trait PoolStats: Send + Sync {
    fn connection_count(&self) -> usize;
    fn idle_connection_count(&self) -> usize;
    fn multiplexed_connection_count(&self) -> usize;
}

pub trait DispatcherStats: Send + Sync {
    /// Asynchronous calls waiting for a dispatch slot.
    fn queued_calls(&self) -> usize;

    /// Asynchronous calls currently executing.
    fn running_calls(&self) -> usize;
}

pub trait CacheStats: Send + Sync {
    fn request_count(&self) -> u64;
    fn hit_count(&self) -> u64;
    fn network_count(&self) -> u64;
    fn write_success_count(&self) -> u64;
    fn write_abort_count(&self) -> u64;

    /// Bytes currently stored. Reading it may touch the disk.
    fn size(&self) -> io::Result<u64>;

    fn max_size(&self) -> u64;
}
