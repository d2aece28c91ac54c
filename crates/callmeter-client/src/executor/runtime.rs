use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::{abortable, AbortHandle};
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use callmeter_core::error::{panic_message, CallmeterError, Result};

use super::{BoxTask, TaskExecutor};

/// Executor that spawns each task onto a tokio runtime.
///
/// In-flight tasks are tracked so `shutdown_now` can cancel them and
/// termination can be awaited.
pub struct TokioExecutor {
    handle: Handle,
    inner: Arc<Inner>,
}

struct Inner {
    shutdown: AtomicBool,
    seq: AtomicU64,
    in_flight: DashMap<u64, AbortHandle>,
    terminated: Notify,
}

impl Inner {
    fn finish(&self, id: u64) {
        self.in_flight.remove(&id);
        self.notify_if_terminated();
    }

    fn is_terminated(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) && self.in_flight.is_empty()
    }

    fn notify_if_terminated(&self) {
        if self.is_terminated() {
            self.terminated.notify_waiters();
        }
    }
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            inner: Arc::new(Inner {
                shutdown: AtomicBool::new(false),
                seq: AtomicU64::new(1),
                in_flight: DashMap::new(),
                terminated: Notify::new(),
            }),
        }
    }

    /// Executor on the runtime this is called from.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| CallmeterError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self::new(handle))
    }

    /// Tasks queued or running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }
}

#[async_trait]
impl TaskExecutor for TokioExecutor {
    fn execute(&self, task: BoxTask) -> Result<()> {
        let id = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let (task, abort) = abortable(AssertUnwindSafe(task).catch_unwind());
        self.inner.in_flight.insert(id, abort);

        // Checked after insertion so shutdown_now never misses a task.
        if self.inner.shutdown.load(Ordering::SeqCst) {
            self.inner.finish(id);
            return Err(CallmeterError::Rejected("executor is shut down".into()));
        }

        let inner = Arc::clone(&self.inner);
        self.handle.spawn(async move {
            if let Ok(Err(payload)) = task.await {
                tracing::warn!(task = id, panic = %panic_message(payload.as_ref()), "task panicked");
            }
            inner.finish(id);
        });
        Ok(())
    }

    fn shutdown(&self) {
        if !self.inner.shutdown.swap(true, Ordering::SeqCst) {
            tracing::debug!(in_flight = self.inner.in_flight.len(), "executor shutting down");
        }
        self.inner.notify_if_terminated();
    }

    fn shutdown_now(&self) -> usize {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let mut cancelled = 0;
        for entry in self.inner.in_flight.iter() {
            entry.value().abort();
            cancelled += 1;
        }
        tracing::debug!(cancelled, "executor shut down now");
        self.inner.notify_if_terminated();
        cancelled
    }

    fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    async fn await_termination(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                // Created before the check so a wakeup in between is not lost.
                let notified = self.inner.terminated.notified();
                if self.inner.is_terminated() {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(timeout, wait).await;
        self.inner.is_terminated()
    }
}
