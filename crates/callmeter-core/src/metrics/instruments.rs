use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::Result;

use super::Histogram;

/// Signed running count (in-flight work, pool checkouts).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn dec(&self) {
        self.dec_by(1);
    }

    pub fn inc_by(&self, n: i64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec_by(&self, n: i64) {
        self.value.fetch_sub(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Monotonic event count with its mean rate since creation.
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    created: Instant,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            created: Instant::now(),
        }
    }
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one event.
    pub fn mark(&self) {
        self.mark_n(1);
    }

    /// Mark `n` events at once (batch submissions).
    pub fn mark_n(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Events per second since the meter was created.
    pub fn mean_rate(&self) -> f64 {
        let elapsed = self.created.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.count() as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// Meter of timed events plus a nanosecond distribution of their durations.
#[derive(Debug)]
pub struct Timer {
    meter: Meter,
    durations: Histogram,
}

impl Timer {
    pub fn new(significant_figures: u8) -> Result<Self> {
        Ok(Self {
            meter: Meter::new(),
            durations: Histogram::new(significant_figures)?,
        })
    }

    pub fn update(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.durations.update(nanos);
        self.meter.mark();
    }

    /// Start timing; the sample is recorded on `stop()` or drop.
    pub fn time(&self) -> TimerContext<'_> {
        TimerContext {
            timer: self,
            started: Instant::now(),
            stopped: false,
        }
    }

    pub fn count(&self) -> u64 {
        self.meter.count()
    }

    pub fn mean_rate(&self) -> f64 {
        self.meter.mean_rate()
    }

    pub fn snapshot(&self) -> super::HistogramSnapshot {
        self.durations.snapshot()
    }
}

/// Running measurement of a `Timer`. Records exactly once.
pub struct TimerContext<'a> {
    timer: &'a Timer,
    started: Instant,
    stopped: bool,
}

impl TimerContext<'_> {
    /// Record and return the elapsed time.
    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.stopped {
            self.stopped = true;
            self.timer.update(elapsed);
        }
        elapsed
    }
}

impl Drop for TimerContext<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

/// Value supplier behind a gauge.
pub type GaugeFn = Box<dyn Fn() -> f64 + Send + Sync>;

/// Instantaneous value read on demand from its supplier.
pub struct Gauge {
    supplier: GaugeFn,
}

impl Gauge {
    pub fn new(supplier: GaugeFn) -> Self {
        Self { supplier }
    }

    pub fn value(&self) -> f64 {
        (self.supplier)()
    }
}

/// `numerator / denominator`, NaN when the denominator is zero or not finite.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || numerator.is_nan() {
        f64::NAN
    } else {
        numerator / denominator
    }
}
