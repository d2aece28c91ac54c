use hdrhistogram::Histogram as Hdr;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{CallmeterError, Result};

/// Distribution of `u64` samples (auto-resizing HDR histogram).
#[derive(Debug)]
pub struct Histogram {
    inner: Mutex<Hdr<u64>>,
}

impl Histogram {
    pub fn new(significant_figures: u8) -> Result<Self> {
        let hdr = Hdr::<u64>::new(significant_figures).map_err(|e| {
            CallmeterError::InvalidConfig(format!(
                "histogram precision {significant_figures}: {e:?}"
            ))
        })?;
        Ok(Self {
            inner: Mutex::new(hdr),
        })
    }

    /// Record one sample.
    pub fn update(&self, value: u64) {
        // Auto-resize only fails on u64 overflow of the trackable range.
        let _ = self.inner.lock().record(value);
    }

    /// Number of recorded samples.
    pub fn count(&self) -> u64 {
        self.inner.lock().len()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot::from_hdr(&self.inner.lock())
    }
}

/// Percentile breakdown of a histogram at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
}

impl HistogramSnapshot {
    /// Returns zeroed values if the histogram is empty.
    fn from_hdr(hist: &Hdr<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            count: hist.len(),
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
            p999: hist.value_at_quantile(0.999),
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            p999: 0,
        }
    }
}
