use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use callmeter_core::event::{Edge, Phase};
use callmeter_core::metrics::{Meter, MetricKind, Timer};
use callmeter_core::{CallId, LifecycleEvent, LifecycleObserver, MetricNamer, MetricSink, Result};

struct PhaseMetrics {
    start: Arc<Meter>,
    end: Arc<Meter>,
    failed: Option<Arc<Meter>>,
    duration: Arc<Timer>,
}

impl PhaseMetrics {
    fn new(sink: &dyn MetricSink, namer: &MetricNamer, phase: Phase) -> Result<Self> {
        let id = |edge: &str| namer.id(&format!("{}-{edge}", phase.as_str()));
        let failed = if phase.has_failure_event() {
            Some(sink.meter(&id("failed"))?)
        } else {
            None
        };
        Ok(Self {
            start: sink.meter(&id("start"))?,
            end: sink.meter(&id("end"))?,
            failed,
            duration: sink.timer(&id("duration"))?,
        })
    }

    fn names(namer: &MetricNamer, phase: Phase, out: &mut Vec<(String, MetricKind)>) {
        let id = |edge: &str| namer.id(&format!("{}-{edge}", phase.as_str()));
        out.push((id("start"), MetricKind::Meter));
        out.push((id("end"), MetricKind::Meter));
        if phase.has_failure_event() {
            out.push((id("failed"), MetricKind::Meter));
        }
        out.push((id("duration"), MetricKind::Timer));
    }
}

/// Per-phase start/end/failure counts and durations for every call.
///
/// Open phases are keyed by `(call, phase)`; at most one start is open per
/// pair (a repeated start restarts the clock). An end or failure without an
/// open start records nothing. `CallEnd`/`CallFailed` release every entry
/// the call still holds.
pub struct CallMetricsObserver {
    phases: Vec<PhaseMetrics>,
    open: DashMap<(CallId, Phase), Instant>,
}

impl CallMetricsObserver {
    pub fn new(sink: &dyn MetricSink, namer: &MetricNamer) -> Result<Self> {
        let phases = Phase::ALL
            .iter()
            .map(|p| PhaseMetrics::new(sink, namer, *p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            phases,
            open: DashMap::new(),
        })
    }

    /// Names `new` registers under `namer`.
    pub fn metric_names(namer: &MetricNamer) -> Vec<(String, MetricKind)> {
        let mut names = Vec::new();
        for phase in Phase::ALL {
            PhaseMetrics::names(namer, phase, &mut names);
        }
        names
    }

    /// Open `(call, phase)` entries across all calls.
    pub fn open_phases(&self) -> usize {
        self.open.len()
    }

    pub fn is_open(&self, call: CallId, phase: Phase) -> bool {
        self.open.contains_key(&(call, phase))
    }

    fn metrics(&self, phase: Phase) -> &PhaseMetrics {
        &self.phases[phase.index()]
    }

    fn start(&self, call: CallId, phase: Phase) {
        self.metrics(phase).start.mark();
        self.open.insert((call, phase), Instant::now());
    }

    /// Close an open phase. Returns false on a correlation miss.
    fn close(&self, call: CallId, phase: Phase, edge: Edge) -> bool {
        let Some((_, started)) = self.open.remove(&(call, phase)) else {
            return false;
        };
        let m = self.metrics(phase);
        m.duration.update(started.elapsed());
        match edge {
            Edge::Failed => {
                if let Some(failed) = &m.failed {
                    failed.mark();
                }
            }
            _ => m.end.mark(),
        }
        true
    }

    /// Fail the innermost open phase of a request or response.
    fn fail_open(&self, call: CallId, body: Phase, headers: Phase) {
        if !self.close(call, body, Edge::Failed) {
            self.close(call, headers, Edge::Failed);
        }
    }

    fn release(&self, call: CallId) {
        for phase in Phase::ALL {
            self.open.remove(&(call, phase));
        }
    }
}

impl LifecycleObserver for CallMetricsObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        let call = event.call();
        match event {
            LifecycleEvent::RequestFailed { .. } => {
                self.fail_open(call, Phase::RequestBody, Phase::RequestHeaders)
            }
            LifecycleEvent::ResponseFailed { .. } => {
                self.fail_open(call, Phase::ResponseBody, Phase::ResponseHeaders)
            }
            _ => match event.phase_edge() {
                Some((phase, Edge::Start)) => self.start(call, phase),
                Some((phase, edge)) => {
                    self.close(call, phase, edge);
                }
                None => {}
            },
        }

        if event.is_terminal() {
            self.release(call);
        }
    }

    fn name(&self) -> &str {
        "call-metrics"
    }
}
