//! Scripted engine and recording collaborators shared by the client tests.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use callmeter_client::engine::{CacheStats, DispatcherStats, HttpEngine, PoolStats};
use callmeter_client::executor::{BoxTask, TaskExecutor, TokioExecutor};
use callmeter_client::observe::FaultReporter;
use callmeter_core::event::EventKind;
use callmeter_core::{CallId, LifecycleEvent, LifecycleObserver, Result};

/// Engine double: events are emitted by hand, work goes through the
/// installed executor.
pub struct FakeEngine {
    observer: Option<Arc<dyn LifecycleObserver>>,
    executor: Arc<dyn TaskExecutor>,
    pub pool: Arc<FakePool>,
    pub dispatcher: Arc<FakeDispatcher>,
    pub cache: Option<Arc<FakeCache>>,
}

impl FakeEngine {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            observer: None,
            executor,
            pool: Arc::new(FakePool::default()),
            dispatcher: Arc::new(FakeDispatcher::default()),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: FakeCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Deliver `event` to whatever sits in the observer slot.
    pub fn emit(&self, event: LifecycleEvent) {
        if let Some(o) = &self.observer {
            o.on_event(&event);
        }
    }

    /// Dispatch an asynchronous call through the engine's executor.
    pub fn enqueue<F>(&self, work: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let task: BoxTask = Box::pin(work);
        self.executor.execute(task)
    }
}

impl Default for FakeEngine {
    /// Must be called inside a tokio runtime.
    fn default() -> Self {
        Self::new(Arc::new(TokioExecutor::current().expect("tokio runtime")))
    }
}

impl HttpEngine for FakeEngine {
    fn event_observer(&self) -> Option<Arc<dyn LifecycleObserver>> {
        self.observer.clone()
    }

    fn set_event_observer(&mut self, observer: Option<Arc<dyn LifecycleObserver>>) {
        self.observer = observer;
    }

    fn executor(&self) -> Arc<dyn TaskExecutor> {
        Arc::clone(&self.executor)
    }

    fn set_executor(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executor = executor;
    }

    fn connection_pool(&self) -> Arc<dyn PoolStats> {
        Arc::clone(&self.pool) as Arc<dyn PoolStats>
    }

    fn dispatcher(&self) -> Arc<dyn DispatcherStats> {
        Arc::clone(&self.dispatcher) as Arc<dyn DispatcherStats>
    }

    fn cache(&self) -> Option<Arc<dyn CacheStats>> {
        self.cache.clone().map(|c| c as Arc<dyn CacheStats>)
    }
}

#[derive(Default)]
pub struct FakePool {
    pub total: AtomicUsize,
    pub idle: AtomicUsize,
    pub multiplexed: AtomicUsize,
}

impl PoolStats for FakePool {
    fn connection_count(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn idle_connection_count(&self) -> usize {
        self.idle.load(Ordering::Relaxed)
    }

    fn multiplexed_connection_count(&self) -> usize {
        self.multiplexed.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct FakeDispatcher {
    pub queued: AtomicUsize,
    pub running: AtomicUsize,
}

impl DispatcherStats for FakeDispatcher {
    fn queued_calls(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    fn running_calls(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct FakeCache {
    pub requests: AtomicU64,
    pub hits: AtomicU64,
    pub network: AtomicU64,
    pub write_success: AtomicU64,
    pub write_abort: AtomicU64,
    pub size: AtomicU64,
    pub max_size: AtomicU64,
    pub size_fails: AtomicBool,
}

impl CacheStats for FakeCache {
    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn network_count(&self) -> u64 {
        self.network.load(Ordering::Relaxed)
    }

    fn write_success_count(&self) -> u64 {
        self.write_success.load(Ordering::Relaxed)
    }

    fn write_abort_count(&self) -> u64 {
        self.write_abort.load(Ordering::Relaxed)
    }

    fn size(&self) -> io::Result<u64> {
        if self.size_fails.load(Ordering::Relaxed) {
            return Err(io::Error::new(io::ErrorKind::Other, "journal unreadable"));
        }
        Ok(self.size.load(Ordering::Relaxed))
    }

    fn max_size(&self) -> u64 {
        self.max_size.load(Ordering::Relaxed)
    }
}

/// Observer that remembers which events it saw, in order.
#[derive(Default)]
pub struct RecordingObserver {
    pub seen: Mutex<Vec<EventKind>>,
}

impl RecordingObserver {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.seen.lock().clone()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        self.seen.lock().push(event.kind());
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Observer that panics on every event.
pub struct PanickingObserver;

impl LifecycleObserver for PanickingObserver {
    fn on_event(&self, _event: &LifecycleEvent) {
        panic!("observer exploded");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

#[derive(Default)]
pub struct CollectingFaults {
    pub faults: Mutex<Vec<(String, EventKind, String)>>,
}

impl FaultReporter for CollectingFaults {
    fn observer_fault(&self, observer: &str, event: EventKind, message: &str) {
        self.faults
            .lock()
            .push((observer.to_string(), event, message.to_string()));
    }
}

pub fn endpoint(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], port))
}

pub fn io_error(msg: &str) -> Arc<io::Error> {
    Arc::new(io::Error::new(io::ErrorKind::Other, msg.to_string()))
}

pub fn call(id: u64) -> CallId {
    CallId::new(id)
}
