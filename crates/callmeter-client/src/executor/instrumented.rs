use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use callmeter_core::error::CallmeterError;
use callmeter_core::metrics::{Counter, Meter, MetricKind, Timer};
use callmeter_core::{MetricNamer, MetricSink, Result};

use super::{BoxTask, TaskExecutor, TaskHandle};

const SUBMITTED: &str = "network-requests-submitted";
const RUNNING: &str = "network-requests-running";
const COMPLETED: &str = "network-requests-completed";
const FAILED: &str = "network-requests-failed";
const CANCELLED: &str = "network-requests-cancelled";
const REJECTED: &str = "network-requests-rejected";
const DURATION: &str = "network-requests-duration";
const QUEUE_TIME: &str = "network-requests-queue-time";

/// Metrics shared by every task an `InstrumentedExecutor` wraps.
pub struct TaskMetrics {
    submitted: Arc<Meter>,
    running: Arc<Counter>,
    completed: Arc<Meter>,
    failed: Arc<Meter>,
    cancelled: Arc<Meter>,
    rejected: Arc<Meter>,
    duration: Arc<Timer>,
    queue_time: Arc<Timer>,
}

impl TaskMetrics {
    pub fn new(sink: &dyn MetricSink, namer: &MetricNamer) -> Result<Self> {
        Ok(Self {
            submitted: sink.meter(&namer.id(SUBMITTED))?,
            running: sink.counter(&namer.id(RUNNING))?,
            completed: sink.meter(&namer.id(COMPLETED))?,
            failed: sink.meter(&namer.id(FAILED))?,
            cancelled: sink.meter(&namer.id(CANCELLED))?,
            rejected: sink.meter(&namer.id(REJECTED))?,
            duration: sink.timer(&namer.id(DURATION))?,
            queue_time: sink.timer(&namer.id(QUEUE_TIME))?,
        })
    }

    /// Names `new` registers under `namer`.
    pub fn metric_names(namer: &MetricNamer) -> Vec<(String, MetricKind)> {
        let mut names: Vec<_> = [SUBMITTED, COMPLETED, FAILED, CANCELLED, REJECTED]
            .iter()
            .map(|s| (namer.id(s), MetricKind::Meter))
            .collect();
        names.push((namer.id(RUNNING), MetricKind::Counter));
        names.push((namer.id(DURATION), MetricKind::Timer));
        names.push((namer.id(QUEUE_TIME), MetricKind::Timer));
        names
    }

    /// Tasks currently executing.
    pub fn running(&self) -> i64 {
        self.running.count()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.count()
    }

    pub fn completed(&self) -> u64 {
        self.completed.count()
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.count()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.count()
    }
}

const PENDING: u8 = 0;
const ADMITTED: u8 = 1;
const REFUSED: u8 = 2;
const DROPPED: u8 = 3;

/// Whether the delegate accepted a task, shared between the task and the
/// submitting call. A delegate may drop a task it refuses before answering,
/// so an unstarted drop while still pending is settled by the submitter.
#[derive(Clone)]
struct Admission(Arc<AtomicU8>);

impl Admission {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(PENDING)))
    }

    /// Unstarted task dropped. True when it counts as cancelled right away.
    fn dropped_unstarted(&self) -> bool {
        match self
            .0
            .compare_exchange(PENDING, DROPPED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => false,
            Err(state) => state == ADMITTED,
        }
    }

    /// Record the delegate's answer. True when the task was already dropped
    /// unstarted while pending.
    fn settle(&self, admitted: bool) -> bool {
        let to = if admitted { ADMITTED } else { REFUSED };
        self.0
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_err_and(|state| state == DROPPED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Queued,
    Running,
    Done,
}

struct TaskRecord {
    submitted_at: Instant,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
}

impl TaskRecord {
    fn new() -> Self {
        Self {
            submitted_at: Instant::now(),
            started_at: None,
            ended_at: None,
        }
    }

    fn state(&self) -> TaskState {
        match (self.started_at, self.ended_at) {
            (None, _) => TaskState::Queued,
            (Some(_), None) => TaskState::Running,
            (Some(_), Some(_)) => TaskState::Done,
        }
    }
}

/// A task wrapped with its record. Starts timing on first poll, not on
/// submission.
struct Instrumented<F> {
    inner: Pin<Box<F>>,
    record: TaskRecord,
    admission: Admission,
    metrics: Arc<TaskMetrics>,
}

impl<F> Instrumented<F> {
    fn new(task: F, admission: Admission, metrics: Arc<TaskMetrics>) -> Self {
        Self {
            inner: Box::pin(task),
            record: TaskRecord::new(),
            admission,
            metrics,
        }
    }

    fn start(&mut self) {
        let now = Instant::now();
        self.record.started_at = Some(now);
        self.metrics.running.inc();
        self.metrics
            .queue_time
            .update(now.saturating_duration_since(self.record.submitted_at));
    }

    fn finish(&mut self, outcome: Outcome) {
        let (Some(started), None) = (self.record.started_at, self.record.ended_at) else {
            return;
        };
        let now = Instant::now();
        self.record.ended_at = Some(now);

        self.metrics.duration.update(now.saturating_duration_since(started));
        self.metrics.running.dec();
        self.metrics.completed.mark();
        match outcome {
            Outcome::Completed => {}
            Outcome::Failed => self.metrics.failed.mark(),
            Outcome::Cancelled => self.metrics.cancelled.mark(),
        }
    }
}

impl<F: Future> Future for Instrumented<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let this = &mut *self;
        if this.record.state() == TaskState::Queued {
            this.start();
        }

        let inner = &mut this.inner;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(out)) => {
                this.finish(Outcome::Completed);
                Poll::Ready(out)
            }
            Err(payload) => {
                this.finish(Outcome::Failed);
                panic::resume_unwind(payload)
            }
        }
    }
}

impl<F> Drop for Instrumented<F> {
    fn drop(&mut self) {
        match self.record.state() {
            TaskState::Queued => {
                if self.admission.dropped_unstarted() {
                    self.metrics.cancelled.mark();
                }
            }
            TaskState::Running => self.finish(Outcome::Cancelled),
            TaskState::Done => {}
        }
    }
}

/// Executor decorator that meters every task handed to it.
///
/// Submissions are counted before the delegate sees them, so rejected work
/// still shows up in `network-requests-submitted`; it is then marked
/// `network-requests-rejected`, never cancelled. Each task, whether single
/// or part of a batch, is wrapped individually. Shutdown and termination
/// queries pass straight through.
pub struct InstrumentedExecutor<E = Arc<dyn TaskExecutor>> {
    delegate: E,
    metrics: Arc<TaskMetrics>,
}

impl<E: TaskExecutor> InstrumentedExecutor<E> {
    pub fn new(delegate: E, sink: &dyn MetricSink, namer: &MetricNamer) -> Result<Self> {
        Ok(Self::with_metrics(delegate, Arc::new(TaskMetrics::new(sink, namer)?)))
    }

    pub fn with_metrics(delegate: E, metrics: Arc<TaskMetrics>) -> Self {
        Self { delegate, metrics }
    }

    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    pub fn metrics(&self) -> &Arc<TaskMetrics> {
        &self.metrics
    }

    pub fn into_inner(self) -> E {
        self.delegate
    }

    fn wrap<F>(&self, task: F) -> (Instrumented<F>, Admission) {
        let admission = Admission::new();
        let task = Instrumented::new(task, admission.clone(), Arc::clone(&self.metrics));
        (task, admission)
    }

    fn wrap_all<F>(&self, tasks: Vec<F>) -> (Vec<Instrumented<F>>, Vec<Admission>) {
        self.metrics.submitted.mark_n(tasks.len() as u64);
        tasks.into_iter().map(|t| self.wrap(t)).unzip()
    }

    /// Apply the delegate's answer to every task it was handed. A rejected
    /// batch counts each of its tasks as rejected.
    fn settle<T>(&self, outcome: &Result<T>, admissions: &[Admission]) {
        let admitted = !matches!(outcome, Err(CallmeterError::Rejected(_)));
        if !admitted {
            self.metrics.rejected.mark_n(admissions.len() as u64);
        }
        for admission in admissions {
            if admission.settle(admitted) && admitted {
                self.metrics.cancelled.mark();
            }
        }
    }
}

#[async_trait]
impl<E: TaskExecutor> TaskExecutor for InstrumentedExecutor<E> {
    fn execute(&self, task: BoxTask) -> Result<()> {
        self.metrics.submitted.mark();
        let (task, admission) = self.wrap(task);
        let outcome = self.delegate.execute(Box::pin(task));
        self.settle(&outcome, &[admission]);
        outcome
    }

    fn shutdown(&self) {
        self.delegate.shutdown()
    }

    fn shutdown_now(&self) -> usize {
        self.delegate.shutdown_now()
    }

    fn is_shutdown(&self) -> bool {
        self.delegate.is_shutdown()
    }

    fn is_terminated(&self) -> bool {
        self.delegate.is_terminated()
    }

    async fn await_termination(&self, timeout: Duration) -> bool {
        self.delegate.await_termination(timeout).await
    }

    fn submit<F>(&self, task: F) -> Result<TaskHandle<F::Output>>
    where
        Self: Sized,
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.metrics.submitted.mark();
        let (task, admission) = self.wrap(task);
        let outcome = self.delegate.submit(task);
        self.settle(&outcome, &[admission]);
        outcome
    }

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
        let (wrapped, admissions) = self.wrap_all(tasks);
        let outcome = self.delegate.invoke_all(wrapped, deadline).await;
        self.settle(&outcome, &admissions);
        outcome
    }

    async fn invoke_any<F>(&self, tasks: Vec<F>, deadline: Option<Duration>) -> Result<F::Output>
    where
        Self: Sized,
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (wrapped, admissions) = self.wrap_all(tasks);
        let outcome = self.delegate.invoke_any(wrapped, deadline).await;
        self.settle(&outcome, &admissions);
        outcome
    }
}
