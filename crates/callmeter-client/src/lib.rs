//! callmeter client instrumentation.
//!
//! This crate attaches metrics to an HTTP engine: it fans the engine's
//! lifecycle events out to connection and call observers, meters the tasks
//! the engine dispatches, and exports the engine's pool, cache and
//! dispatcher state as gauges. `InstrumentedClient` wires all of it.

pub mod client;
pub mod config;
pub mod engine;
pub mod executor;
pub mod observe;

pub use client::{BuildError, ClientBuilder, InstrumentedClient};
pub use config::InstrumentationConfig;
pub use engine::{CacheStats, DispatcherStats, HttpEngine, PoolStats};
pub use executor::{InstrumentedExecutor, TaskExecutor, TaskHandle, TaskMetrics, TokioExecutor};
pub use observe::{
    CallMetricsObserver, ConnectionMetricsObserver, EventMultiplexer, FaultReporter,
    TracingFaultReporter,
};
