use std::sync::Arc;

use callmeter_core::event::EventKind;
use callmeter_core::metrics::Meter;

/// Receives observer faults isolated by the multiplexer.
pub trait FaultReporter: Send + Sync {
    fn observer_fault(&self, observer: &str, event: EventKind, message: &str);
}

/// Logs faults through `tracing` and optionally counts them.
#[derive(Default)]
pub struct TracingFaultReporter {
    faults: Option<Arc<Meter>>,
}

impl TracingFaultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also mark `meter` once per fault.
    pub fn with_meter(meter: Arc<Meter>) -> Self {
        Self {
            faults: Some(meter),
        }
    }
}

impl FaultReporter for TracingFaultReporter {
    fn observer_fault(&self, observer: &str, event: EventKind, message: &str) {
        if let Some(m) = &self.faults {
            m.mark();
        }
        tracing::error!(%observer, %event, %message, "lifecycle observer panicked; event skipped for it");
    }
}
