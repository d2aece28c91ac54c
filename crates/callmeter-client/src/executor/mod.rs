//! Task execution engines.
//!
//! `TaskExecutor` is the submission surface an HTTP engine dispatches
//! asynchronous calls through. Its object-safe core is `execute` plus the
//! lifecycle queries; the typed submission shapes (`submit`, `invoke_all`,
//! `invoke_any`) are provided on top of `execute` and can be overridden.

pub mod handle;
pub mod instrumented;
pub mod runtime;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{abortable, select_ok, Aborted};
use futures_util::FutureExt;
use tokio::sync::oneshot;

use callmeter_core::error::{panic_message, CallmeterError, Result};

pub use handle::TaskHandle;
pub use instrumented::{InstrumentedExecutor, TaskMetrics};
pub use runtime::TokioExecutor;

/// Type-erased unit of work.
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Queue a task. Fails with `Rejected` once the executor is shut down.
    fn execute(&self, task: BoxTask) -> Result<()>;

    /// Stop accepting work; queued and running tasks still finish.
    fn shutdown(&self);

    /// Stop accepting work and cancel everything in flight.
    /// Returns how many tasks were cancelled.
    fn shutdown_now(&self) -> usize;

    fn is_shutdown(&self) -> bool;

    /// Shut down and every task finished.
    fn is_terminated(&self) -> bool;

    /// Wait up to `timeout` for termination. Returns `is_terminated()`.
    async fn await_termination(&self, timeout: Duration) -> bool;

    /// Queue a value-returning task.
    ///
    /// A panic inside the task resolves the handle to `Panicked`; cancelling
    /// the handle before the task starts means it never runs.
    fn submit<F>(&self, task: F) -> Result<TaskHandle<F::Output>>
    where
        Self: Sized,
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (task, abort) = abortable(AssertUnwindSafe(task).catch_unwind());
        let (tx, rx) = oneshot::channel();
        self.execute(Box::pin(async move {
            let out = match task.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(payload)) => Err(CallmeterError::Panicked(panic_message(payload.as_ref()))),
                Err(Aborted) => Err(CallmeterError::Cancelled),
            };
            let _ = tx.send(out);
        }))?;
        Ok(TaskHandle::new(rx, abort))
    }

    /// Queue a blocking closure.
    fn submit_fn<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        Self: Sized,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit(async move { f() })
    }

    /// Run every task and wait for all of them.
    ///
    /// Results come back in submission order. With a deadline, tasks still
    /// unfinished when it passes are cancelled and report `Cancelled`.
    async fn invoke_all<F>(
        &self,
        tasks: Vec<F>,
        deadline: Option<Duration>,
    ) -> Result<Vec<Result<F::Output>>>
    where
        Self: Sized,
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handles = submit_batch(self, tasks)?;
        let mut results = Vec::with_capacity(handles.len());

        let Some(deadline) = deadline else {
            for handle in handles {
                results.push(handle.await);
            }
            return Ok(results);
        };

        let until = tokio::time::Instant::now() + deadline;
        let mut expired = false;
        for mut handle in handles {
            if !expired {
                match tokio::time::timeout_at(until, &mut handle).await {
                    Ok(res) => {
                        results.push(res);
                        continue;
                    }
                    Err(_) => expired = true,
                }
            }
            let res = match handle.try_result() {
                Some(res) => res,
                None => {
                    handle.cancel();
                    Err(CallmeterError::Cancelled)
                }
            };
            results.push(res);
        }
        Ok(results)
    }

    /// Run every task and return the first successful result.
    ///
    /// The others are cancelled once a winner is known. Fails with the last
    /// task error when all fail, `TimedOut` when the deadline passes first,
    /// and `EmptyBatch` for no tasks.
    async fn invoke_any<F>(&self, tasks: Vec<F>, deadline: Option<Duration>) -> Result<F::Output>
    where
        Self: Sized,
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if tasks.is_empty() {
            return Err(CallmeterError::EmptyBatch);
        }
        let handles = submit_batch(self, tasks)?;
        let aborts: Vec<_> = handles.iter().map(TaskHandle::abort_handle).collect();

        let race = select_ok(handles);
        let winner = match deadline {
            Some(d) => match tokio::time::timeout(d, race).await {
                Ok(res) => res,
                Err(_) => Err(CallmeterError::TimedOut),
            },
            None => race.await,
        };

        for abort in &aborts {
            abort.abort();
        }
        winner.map(|(value, _rest)| value)
    }
}

/// Submit a whole batch, cancelling what was queued if one submission fails.
fn submit_batch<E, F>(executor: &E, tasks: Vec<F>) -> Result<Vec<TaskHandle<F::Output>>>
where
    E: TaskExecutor,
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        match executor.submit(task) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                for h in &handles {
                    h.cancel();
                }
                return Err(e);
            }
        }
    }
    Ok(handles)
}

#[async_trait]
impl<T> TaskExecutor for Arc<T>
where
    T: TaskExecutor + ?Sized,
{
    fn execute(&self, task: BoxTask) -> Result<()> {
        (**self).execute(task)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }

    fn shutdown_now(&self) -> usize {
        (**self).shutdown_now()
    }

    fn is_shutdown(&self) -> bool {
        (**self).is_shutdown()
    }

    fn is_terminated(&self) -> bool {
        (**self).is_terminated()
    }

    async fn await_termination(&self, timeout: Duration) -> bool {
        (**self).await_termination(timeout).await
    }
}
