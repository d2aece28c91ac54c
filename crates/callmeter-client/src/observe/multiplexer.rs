use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use callmeter_core::error::panic_message;
use callmeter_core::{LifecycleEvent, LifecycleObserver};

use super::fault::{FaultReporter, TracingFaultReporter};

/// Fans one event stream out to many observers.
///
/// Delivery is synchronous, on the caller's thread, in registration order.
/// Nothing is buffered. A panicking observer is reported to the
/// `FaultReporter` and skipped; the remaining observers still run and the
/// engine never sees the panic.
pub struct EventMultiplexer {
    observers: Vec<Arc<dyn LifecycleObserver>>,
    faults: Arc<dyn FaultReporter>,
}

impl EventMultiplexer {
    pub fn new(observers: Vec<Arc<dyn LifecycleObserver>>) -> Self {
        Self::with_fault_reporter(observers, Arc::new(TracingFaultReporter::new()))
    }

    pub fn with_fault_reporter(
        observers: Vec<Arc<dyn LifecycleObserver>>,
        faults: Arc<dyn FaultReporter>,
    ) -> Self {
        Self { observers, faults }
    }

    pub fn observers(&self) -> &[Arc<dyn LifecycleObserver>] {
        &self.observers
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl LifecycleObserver for EventMultiplexer {
    fn on_event(&self, event: &LifecycleEvent) {
        for observer in &self.observers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
            if let Err(payload) = outcome {
                self.faults.observer_fault(
                    observer.name(),
                    event.kind(),
                    &panic_message(payload.as_ref()),
                );
            }
        }
    }

    fn name(&self) -> &str {
        "event-multiplexer"
    }
}
