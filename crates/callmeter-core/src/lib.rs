//! callmeter core: engine-agnostic lifecycle model, metric storage, and errors.
//!
//! This crate defines the event contract an HTTP engine emits, the observer
//! capability that reacts to it, and the in-process metric sink the
//! instrumentation layer records into. It has no async runtime dependency, so
//! engines and reporters can depend on it without pulling in tokio or the
//! client layer.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Instrumentation must never take down the process it observes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod event;
pub mod metrics;

/// Shared result type.
pub use error::{CallmeterError, ErrorKind, Result};
pub use event::{CallId, ConnectionId, LifecycleEvent, LifecycleObserver};
pub use metrics::{MetricNamer, MetricRegistry, MetricSink};
