//! Instrumented client facade.
//!
//! Wrapping an engine registers its gauges, installs an `EventMultiplexer`
//! in the engine's observer slot and swaps its executor for an
//! `InstrumentedExecutor`. Every name is checked against the sink before
//! anything is registered, so a naming collision fails construction without
//! touching the sink and hands the engine back unchanged.

use std::error::Error;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use callmeter_core::error::{CallmeterError, ErrorKind};
use callmeter_core::metrics::{ratio, GaugeFn, MetricKind};
use callmeter_core::{LifecycleObserver, MetricNamer, MetricSink, Result};

use crate::config::schema::DEFAULT_PREFIX;
use crate::config::InstrumentationConfig;
use crate::engine::{CacheStats, HttpEngine};
use crate::executor::{InstrumentedExecutor, TaskExecutor, TaskMetrics};
use crate::observe::{
    CallMetricsObserver, ConnectionMetricsObserver, EventMultiplexer, FaultReporter,
    TracingFaultReporter,
};

pub struct InstrumentedClient<E: HttpEngine> {
    engine: E,
    namer: MetricNamer,
    multiplexer: Arc<EventMultiplexer>,
    executor: Arc<InstrumentedExecutor>,
    connections: Option<Arc<ConnectionMetricsObserver>>,
    calls: Option<Arc<CallMetricsObserver>>,
    original_observer: Option<Arc<dyn LifecycleObserver>>,
    original_executor: Arc<dyn TaskExecutor>,
}

impl<E: HttpEngine> InstrumentedClient<E> {
    /// Wrap `engine` with default settings under the given instance name.
    pub fn new(
        sink: &dyn MetricSink,
        engine: E,
        name: Option<&str>,
    ) -> std::result::Result<Self, BuildError<E>> {
        let mut builder = ClientBuilder::new(sink);
        if let Some(name) = name {
            builder = builder.name(name);
        }
        builder.build(engine)
    }

    pub fn builder(sink: &dyn MetricSink) -> ClientBuilder<'_> {
        ClientBuilder::new(sink)
    }

    /// Full metric name for `suffix` under this client's prefix and name.
    pub fn metric_id(&self, suffix: &str) -> String {
        self.namer.id(suffix)
    }

    pub fn namer(&self) -> &MetricNamer {
        &self.namer
    }

    pub fn multiplexer(&self) -> &Arc<EventMultiplexer> {
        &self.multiplexer
    }

    pub fn instrumented_executor(&self) -> &Arc<InstrumentedExecutor> {
        &self.executor
    }

    pub fn task_metrics(&self) -> &Arc<TaskMetrics> {
        self.executor.metrics()
    }

    pub fn connection_observer(&self) -> Option<&Arc<ConnectionMetricsObserver>> {
        self.connections.as_ref()
    }

    pub fn call_observer(&self) -> Option<&Arc<CallMetricsObserver>> {
        self.calls.as_ref()
    }

    /// Restore the engine's original observer and executor and hand it back.
    pub fn into_inner(self) -> E {
        let Self {
            mut engine,
            original_observer,
            original_executor,
            ..
        } = self;
        engine.set_event_observer(original_observer);
        engine.set_executor(original_executor);
        engine
    }
}

/// Failed construction. Carries the engine back untouched.
pub struct BuildError<E> {
    pub error: CallmeterError,
    pub engine: E,
}

impl<E> BuildError<E> {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn into_error(self) -> CallmeterError {
        self.error
    }
}

impl<E> fmt::Debug for BuildError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildError").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<E> fmt::Display for BuildError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to instrument http client: {}", self.error)
    }
}

impl<E> Error for BuildError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

impl<E> From<BuildError<E>> for CallmeterError {
    fn from(e: BuildError<E>) -> Self {
        e.error
    }
}

impl<E: HttpEngine> Deref for InstrumentedClient<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.engine
    }
}

pub struct ClientBuilder<'a> {
    sink: &'a dyn MetricSink,
    prefix: String,
    name: Option<String>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    faults: Option<Arc<dyn FaultReporter>>,
    track_connections: bool,
    track_calls: bool,
}

impl<'a> ClientBuilder<'a> {
    pub fn new(sink: &'a dyn MetricSink) -> Self {
        Self {
            sink,
            prefix: DEFAULT_PREFIX.into(),
            name: None,
            observers: Vec::new(),
            faults: None,
            track_connections: true,
            track_calls: true,
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Instance name distinguishing several clients in one registry.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.is_empty()).then_some(name);
        self
    }

    /// Extra observer, run after the engine's own and before the built-ins.
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn fault_reporter(mut self, faults: Arc<dyn FaultReporter>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn track_connections(mut self, on: bool) -> Self {
        self.track_connections = on;
        self
    }

    pub fn track_calls(mut self, on: bool) -> Self {
        self.track_calls = on;
        self
    }

    pub fn config(mut self, cfg: &InstrumentationConfig) -> Self {
        self.prefix = cfg.client.prefix.clone();
        self.name = cfg.client.instance_name().map(str::to_owned);
        self.track_connections = cfg.observers.connections;
        self.track_calls = cfg.observers.calls;
        self
    }

    pub fn build_default<E: HttpEngine + Default>(
        self,
    ) -> std::result::Result<InstrumentedClient<E>, BuildError<E>> {
        self.build(E::default())
    }

    pub fn build<E: HttpEngine>(
        self,
        engine: E,
    ) -> std::result::Result<InstrumentedClient<E>, BuildError<E>> {
        let namer = MetricNamer::new(&self.prefix, self.name.as_deref());
        if let Err(error) = self.check_names(&namer, &engine) {
            return Err(BuildError { error, engine });
        }
        match self.wire(namer, engine) {
            Ok(client) => Ok(client),
            Err((error, engine)) => Err(BuildError { error, engine }),
        }
    }

    /// Every name this build would register, with its kind.
    fn metric_names<E: HttpEngine>(
        &self,
        namer: &MetricNamer,
        engine: &E,
    ) -> Vec<(String, MetricKind)> {
        let mut names: Vec<_> = gauge_suffixes(engine.cache().is_some())
            .map(|suffix| (namer.id(suffix), MetricKind::Gauge))
            .collect();
        if self.track_connections {
            names.extend(ConnectionMetricsObserver::metric_names(namer));
        }
        if self.track_calls {
            names.extend(CallMetricsObserver::metric_names(namer));
        }
        if self.faults.is_none() {
            names.push((namer.id(OBSERVER_FAULTS), MetricKind::Meter));
        }
        names.extend(TaskMetrics::metric_names(namer));
        names
    }

    fn check_names<E: HttpEngine>(&self, namer: &MetricNamer, engine: &E) -> Result<()> {
        for (name, kind) in self.metric_names(namer, engine) {
            self.sink.check_available(&name, kind)?;
        }
        Ok(())
    }

    fn register<E: HttpEngine>(&mut self, namer: &MetricNamer, engine: &E) -> Result<Parts> {
        let sink = self.sink;
        let connections = if self.track_connections {
            Some(Arc::new(ConnectionMetricsObserver::new(sink, namer)?))
        } else {
            None
        };
        let calls = if self.track_calls {
            Some(Arc::new(CallMetricsObserver::new(sink, namer)?))
        } else {
            None
        };
        let faults = match self.faults.take() {
            Some(f) => f,
            None => Arc::new(TracingFaultReporter::with_meter(
                sink.meter(&namer.id(OBSERVER_FAULTS))?,
            )),
        };
        let task_metrics = Arc::new(TaskMetrics::new(sink, namer)?);
        // Gauges last: registration is first-wins and cannot be taken back.
        register_gauges(sink, namer, engine)?;
        Ok(Parts {
            connections,
            calls,
            faults,
            task_metrics,
        })
    }

    fn wire<E: HttpEngine>(
        mut self,
        namer: MetricNamer,
        mut engine: E,
    ) -> std::result::Result<InstrumentedClient<E>, (CallmeterError, E)> {
        let Parts {
            connections,
            calls,
            faults,
            task_metrics,
        } = match self.register(&namer, &engine) {
            Ok(parts) => parts,
            Err(e) => return Err((e, engine)),
        };

        // Engine's own observer first, then extras, then the built-ins.
        let original_observer = engine.event_observer();
        let mut observers: Vec<Arc<dyn LifecycleObserver>> = Vec::new();
        observers.extend(original_observer.clone());
        observers.extend(self.observers);
        if let Some(c) = &connections {
            observers.push(Arc::clone(c) as Arc<dyn LifecycleObserver>);
        }
        if let Some(c) = &calls {
            observers.push(Arc::clone(c) as Arc<dyn LifecycleObserver>);
        }
        let multiplexer = Arc::new(EventMultiplexer::with_fault_reporter(observers, faults));

        let original_executor = engine.executor();
        let executor = Arc::new(InstrumentedExecutor::with_metrics(
            Arc::clone(&original_executor),
            task_metrics,
        ));

        engine.set_event_observer(Some(Arc::clone(&multiplexer) as Arc<dyn LifecycleObserver>));
        engine.set_executor(Arc::clone(&executor) as Arc<dyn TaskExecutor>);

        tracing::debug!(
            metrics = %namer.base(),
            observers = multiplexer.len(),
            connections = self.track_connections,
            calls = self.track_calls,
            cache = engine.cache().is_some(),
            "instrumented http client"
        );

        Ok(InstrumentedClient {
            engine,
            namer,
            multiplexer,
            executor,
            connections,
            calls,
            original_observer,
            original_executor,
        })
    }
}

struct Parts {
    connections: Option<Arc<ConnectionMetricsObserver>>,
    calls: Option<Arc<CallMetricsObserver>>,
    faults: Arc<dyn FaultReporter>,
    task_metrics: Arc<TaskMetrics>,
}

const OBSERVER_FAULTS: &str = "observer-faults";

static POOL_GAUGES: [&str; 3] = [
    "connection-pool-count",
    "connection-pool-count-idle",
    "connection-pool-count-multiplexed",
];

static CACHE_GAUGES: [&str; 8] = [
    "cache-request-count",
    "cache-hit-count",
    "cache-network-count",
    "cache-write-success-count",
    "cache-write-abort-count",
    "cache-current-size",
    "cache-max-size",
    "cache-size",
];

static DISPATCHER_GAUGES: [&str; 2] = ["queued-network-requests", "running-network-requests"];

fn gauge_suffixes(cache: bool) -> impl Iterator<Item = &'static str> {
    let cache: &'static [&'static str] = if cache { &CACHE_GAUGES } else { &[] };
    POOL_GAUGES
        .iter()
        .chain(cache)
        .chain(DISPATCHER_GAUGES.iter())
        .copied()
}

fn gauge<F>(sink: &dyn MetricSink, namer: &MetricNamer, suffix: &str, f: F) -> Result<()>
where
    F: Fn() -> f64 + Send + Sync + 'static,
{
    let supplier: GaugeFn = Box::new(f);
    sink.gauge(&namer.id(suffix), supplier)
}

fn register_gauges<E: HttpEngine>(sink: &dyn MetricSink, namer: &MetricNamer, engine: &E) -> Result<()> {
    let pool = engine.connection_pool();
    let p = Arc::clone(&pool);
    gauge(sink, namer, "connection-pool-count", move || p.connection_count() as f64)?;
    let p = Arc::clone(&pool);
    gauge(sink, namer, "connection-pool-count-idle", move || p.idle_connection_count() as f64)?;
    gauge(sink, namer, "connection-pool-count-multiplexed", move || {
        pool.multiplexed_connection_count() as f64
    })?;

    if let Some(cache) = engine.cache() {
        let c = Arc::clone(&cache);
        gauge(sink, namer, "cache-request-count", move || c.request_count() as f64)?;
        let c = Arc::clone(&cache);
        gauge(sink, namer, "cache-hit-count", move || c.hit_count() as f64)?;
        let c = Arc::clone(&cache);
        gauge(sink, namer, "cache-network-count", move || c.network_count() as f64)?;
        let c = Arc::clone(&cache);
        gauge(sink, namer, "cache-write-success-count", move || c.write_success_count() as f64)?;
        let c = Arc::clone(&cache);
        gauge(sink, namer, "cache-write-abort-count", move || c.write_abort_count() as f64)?;
        let c = Arc::clone(&cache);
        gauge(sink, namer, "cache-current-size", move || current_cache_size(c.as_ref()))?;
        let c = Arc::clone(&cache);
        gauge(sink, namer, "cache-max-size", move || c.max_size() as f64)?;
        gauge(sink, namer, "cache-size", move || {
            ratio(current_cache_size(cache.as_ref()), cache.max_size() as f64)
        })?;
    }

    let dispatcher = engine.dispatcher();
    let d = Arc::clone(&dispatcher);
    gauge(sink, namer, "queued-network-requests", move || d.queued_calls() as f64)?;
    gauge(sink, namer, "running-network-requests", move || dispatcher.running_calls() as f64)?;
    Ok(())
}

fn current_cache_size(cache: &dyn CacheStats) -> f64 {
    match cache.size() {
        Ok(bytes) => bytes as f64,
        Err(e) => {
            tracing::error!(error = %e, "failed to read http cache size");
            -1.0
        }
    }
}
