//! In-process metric sink.
//!
//! Metrics are keyed by hierarchical dotted names and handed out as shared
//! handles, so hot paths hold an `Arc` and never touch the registry map again.
//! Counters and meters are plain atomics; histograms are HDR histograms behind
//! a short `parking_lot` lock.

pub mod histogram;
pub mod instruments;
pub mod name;
pub mod registry;

pub use histogram::{Histogram, HistogramSnapshot};
pub use instruments::{ratio, Counter, Gauge, GaugeFn, Meter, Timer, TimerContext};
pub use name::MetricNamer;
pub use registry::{MetricKind, MetricRegistry, MetricSink, MetricSnapshot, RegistrySnapshot};

/// Default HDR precision (significant decimal digits).
pub const DEFAULT_SIGNIFICANT_FIGURES: u8 = 3;
