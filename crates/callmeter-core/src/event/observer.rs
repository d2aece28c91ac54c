use super::LifecycleEvent;

/// Anything that reacts to call lifecycle events.
///
/// Handlers run synchronously on whatever thread the engine emits from, for
/// many calls at once, so implementations must be cheap and thread-safe.
/// They must not perform I/O.
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);

    /// Label used when reporting a faulty handler.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> LifecycleObserver for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}
