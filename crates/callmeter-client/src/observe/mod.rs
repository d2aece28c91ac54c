//! Lifecycle observers and the fan-out that feeds them.
//!
//! Engines expose a single observer slot; `EventMultiplexer` fills it and
//! forwards every event to each registered observer in order.

pub mod call;
pub mod connection;
pub mod fault;
pub mod multiplexer;

pub use call::CallMetricsObserver;
pub use connection::ConnectionMetricsObserver;
pub use fault::{FaultReporter, TracingFaultReporter};
pub use multiplexer::EventMultiplexer;
