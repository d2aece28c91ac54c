//! Name-keyed metric registry.
//!
//! Get-or-create semantics: asking twice for the same name and kind returns
//! the same handle. Asking for a name already held by another kind is a
//! configuration mistake and fails fast with `SinkConflict`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::error::{CallmeterError, Result};

use super::{
    Counter, Gauge, GaugeFn, Histogram, HistogramSnapshot, Meter, Timer,
    DEFAULT_SIGNIFICANT_FIGURES,
};

/// Registration surface consumed by the instrumentation layer.
pub trait MetricSink: Send + Sync {
    fn counter(&self, name: &str) -> Result<Arc<Counter>>;
    fn meter(&self, name: &str) -> Result<Arc<Meter>>;
    fn histogram(&self, name: &str) -> Result<Arc<Histogram>>;
    fn timer(&self, name: &str) -> Result<Arc<Timer>>;
    /// Register a derived value. Re-registering an existing gauge is a no-op.
    fn gauge(&self, name: &str, supplier: GaugeFn) -> Result<()>;

    /// Kind currently registered under `name`, if any.
    fn kind_of(&self, name: &str) -> Option<MetricKind>;

    /// Fail with `SinkConflict` if `name` is held by a different kind.
    /// Registers nothing.
    fn check_available(&self, name: &str, kind: MetricKind) -> Result<()> {
        match self.kind_of(name) {
            Some(existing) if existing != kind => Err(CallmeterError::SinkConflict {
                name: name.to_string(),
                existing,
                requested: kind,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Meter,
    Histogram,
    Timer,
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricKind::Counter => "counter",
            MetricKind::Meter => "meter",
            MetricKind::Histogram => "histogram",
            MetricKind::Timer => "timer",
            MetricKind::Gauge => "gauge",
        })
    }
}

#[derive(Clone)]
enum Metric {
    Counter(Arc<Counter>),
    Meter(Arc<Meter>),
    Histogram(Arc<Histogram>),
    Timer(Arc<Timer>),
    Gauge(Arc<Gauge>),
}

impl Metric {
    fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Meter(_) => MetricKind::Meter,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Timer(_) => MetricKind::Timer,
            Metric::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// Process-lifetime metric store backed by `DashMap`.
pub struct MetricRegistry {
    metrics: DashMap<String, Metric>,
    significant_figures: u8,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
            significant_figures: DEFAULT_SIGNIFICANT_FIGURES,
        }
    }

    /// Registry whose histograms and timers keep `n` significant digits (1..=5).
    pub fn with_significant_figures(n: u8) -> Result<Self> {
        if !(1..=5).contains(&n) {
            return Err(CallmeterError::InvalidConfig(
                "significant_figures must be between 1 and 5".into(),
            ));
        }
        Ok(Self {
            metrics: DashMap::new(),
            significant_figures: n,
        })
    }

    fn get_or_create(
        &self,
        name: &str,
        requested: MetricKind,
        create: impl FnOnce() -> Result<Metric>,
    ) -> Result<Metric> {
        if let Some(existing) = self.metrics.get(name) {
            return check_kind(name, existing.value(), requested);
        }
        match self.metrics.entry(name.to_string()) {
            Entry::Occupied(e) => check_kind(name, e.get(), requested),
            Entry::Vacant(e) => {
                let metric = create()?;
                e.insert(metric.clone());
                Ok(metric)
            }
        }
    }

    pub fn get_counter(&self, name: &str) -> Option<Arc<Counter>> {
        match self.metrics.get(name)?.value() {
            Metric::Counter(c) => Some(Arc::clone(c)),
            _ => None,
        }
    }

    pub fn get_meter(&self, name: &str) -> Option<Arc<Meter>> {
        match self.metrics.get(name)?.value() {
            Metric::Meter(m) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    pub fn get_histogram(&self, name: &str) -> Option<Arc<Histogram>> {
        match self.metrics.get(name)?.value() {
            Metric::Histogram(h) => Some(Arc::clone(h)),
            _ => None,
        }
    }

    pub fn get_timer(&self, name: &str) -> Option<Arc<Timer>> {
        match self.metrics.get(name)?.value() {
            Metric::Timer(t) => Some(Arc::clone(t)),
            _ => None,
        }
    }

    pub fn get_gauge(&self, name: &str) -> Option<Arc<Gauge>> {
        match self.metrics.get(name)?.value() {
            Metric::Gauge(g) => Some(Arc::clone(g)),
            _ => None,
        }
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Read every metric (gauges are evaluated now).
    pub fn snapshot(&self) -> RegistrySnapshot {
        // Clone handles first so gauge suppliers never run under a shard lock.
        let handles: Vec<(String, Metric)> = self
            .metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let metrics = handles
            .into_iter()
            .map(|(name, metric)| {
                let snap = match metric {
                    Metric::Counter(c) => MetricSnapshot::Counter { count: c.count() },
                    Metric::Meter(m) => MetricSnapshot::Meter {
                        count: m.count(),
                        mean_rate: m.mean_rate(),
                    },
                    Metric::Histogram(h) => MetricSnapshot::Histogram(h.snapshot()),
                    Metric::Timer(t) => MetricSnapshot::Timer {
                        count: t.count(),
                        mean_rate: t.mean_rate(),
                        nanos: t.snapshot(),
                    },
                    Metric::Gauge(g) => MetricSnapshot::Gauge { value: g.value() },
                };
                (name, snap)
            })
            .collect();

        RegistrySnapshot { metrics }
    }
}

fn check_kind(name: &str, existing: &Metric, requested: MetricKind) -> Result<Metric> {
    if existing.kind() == requested {
        Ok(existing.clone())
    } else {
        Err(conflict(name, existing, requested))
    }
}

impl MetricSink for MetricRegistry {
    fn counter(&self, name: &str) -> Result<Arc<Counter>> {
        match self.get_or_create(name, MetricKind::Counter, || {
            Ok(Metric::Counter(Arc::new(Counter::new())))
        })? {
            Metric::Counter(c) => Ok(c),
            other => Err(conflict(name, &other, MetricKind::Counter)),
        }
    }

    fn meter(&self, name: &str) -> Result<Arc<Meter>> {
        match self.get_or_create(name, MetricKind::Meter, || {
            Ok(Metric::Meter(Arc::new(Meter::new())))
        })? {
            Metric::Meter(m) => Ok(m),
            other => Err(conflict(name, &other, MetricKind::Meter)),
        }
    }

    fn histogram(&self, name: &str) -> Result<Arc<Histogram>> {
        let sf = self.significant_figures;
        match self.get_or_create(name, MetricKind::Histogram, || {
            Ok(Metric::Histogram(Arc::new(Histogram::new(sf)?)))
        })? {
            Metric::Histogram(h) => Ok(h),
            other => Err(conflict(name, &other, MetricKind::Histogram)),
        }
    }

    fn timer(&self, name: &str) -> Result<Arc<Timer>> {
        let sf = self.significant_figures;
        match self.get_or_create(name, MetricKind::Timer, || {
            Ok(Metric::Timer(Arc::new(Timer::new(sf)?)))
        })? {
            Metric::Timer(t) => Ok(t),
            other => Err(conflict(name, &other, MetricKind::Timer)),
        }
    }

    fn gauge(&self, name: &str, supplier: GaugeFn) -> Result<()> {
        self.get_or_create(name, MetricKind::Gauge, || {
            Ok(Metric::Gauge(Arc::new(Gauge::new(supplier))))
        })?;
        Ok(())
    }

    fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.metrics.get(name).map(|m| m.value().kind())
    }
}

fn conflict(name: &str, existing: &Metric, requested: MetricKind) -> CallmeterError {
    tracing::warn!(metric = %name, existing = %existing.kind(), %requested, "metric name already taken");
    CallmeterError::SinkConflict {
        name: name.to_string(),
        existing: existing.kind(),
        requested,
    }
}

/// Serializable view of the whole registry, sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub metrics: BTreeMap<String, MetricSnapshot>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricSnapshot {
    Counter {
        count: i64,
    },
    Meter {
        count: u64,
        mean_rate: f64,
    },
    Histogram(HistogramSnapshot),
    Timer {
        count: u64,
        mean_rate: f64,
        nanos: HistogramSnapshot,
    },
    Gauge {
        value: f64,
    },
}
