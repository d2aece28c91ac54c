use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::AbortHandle;
use tokio::sync::oneshot::{self, error::TryRecvError};

use callmeter_core::error::{CallmeterError, Result};

/// Pending result of a submitted task.
///
/// Resolves to the task's value, `Panicked` if it panicked, or `Cancelled`
/// if it was cancelled or dropped by its executor. Dropping the handle does
/// not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
    abort: AbortHandle,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>, abort: AbortHandle) -> Self {
        Self { rx, abort }
    }

    /// Cancel the task. A task that has not started never runs; a running
    /// one is dropped at its next suspension point.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Result if the task already finished, without waiting.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(res) => Some(res),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(CallmeterError::Cancelled)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CallmeterError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
