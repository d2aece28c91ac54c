use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use callmeter_core::metrics::{Histogram, Meter, MetricKind};
use callmeter_core::{LifecycleEvent, LifecycleObserver, MetricNamer, MetricSink, Result};

/// Connection attempt, failure, and pool checkout counts plus the
/// distribution of connection setup time (microseconds).
///
/// Some engines attribute connect events to the endpoint only, so open
/// attempts are correlated by endpoint address. A second `ConnectStart` for
/// an endpoint whose previous attempt is still open overwrites it: that
/// earlier sample is lost, never misattributed.
pub struct ConnectionMetricsObserver {
    requests: Arc<Meter>,
    failed: Arc<Meter>,
    acquired: Arc<Meter>,
    released: Arc<Meter>,
    setup: Arc<Histogram>,
    open: DashMap<SocketAddr, Instant>,
}

const REQUESTS: &str = "connection-requests";
const FAILED: &str = "connection-failed";
const ACQUIRED: &str = "connection-acquired";
const RELEASED: &str = "connection-released";
const SETUP: &str = "connection-setup";

impl ConnectionMetricsObserver {
    pub fn new(sink: &dyn MetricSink, namer: &MetricNamer) -> Result<Self> {
        Ok(Self {
            requests: sink.meter(&namer.id(REQUESTS))?,
            failed: sink.meter(&namer.id(FAILED))?,
            acquired: sink.meter(&namer.id(ACQUIRED))?,
            released: sink.meter(&namer.id(RELEASED))?,
            setup: sink.histogram(&namer.id(SETUP))?,
            open: DashMap::new(),
        })
    }

    /// Names `new` registers under `namer`.
    pub fn metric_names(namer: &MetricNamer) -> Vec<(String, MetricKind)> {
        let mut names: Vec<_> = [REQUESTS, FAILED, ACQUIRED, RELEASED]
            .iter()
            .map(|s| (namer.id(s), MetricKind::Meter))
            .collect();
        names.push((namer.id(SETUP), MetricKind::Histogram));
        names
    }

    /// Attempts started and not yet ended or failed.
    pub fn open_attempts(&self) -> usize {
        self.open.len()
    }

    pub fn is_open(&self, endpoint: &SocketAddr) -> bool {
        self.open.contains_key(endpoint)
    }

    fn connect_start(&self, endpoint: SocketAddr) {
        self.requests.mark();
        self.open.insert(endpoint, Instant::now());
    }

    fn connect_end(&self, endpoint: &SocketAddr) {
        // Evict before recording so a failed update cannot leave a stale start.
        let Some((_, started)) = self.open.remove(endpoint) else {
            return;
        };
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.setup.update(micros);
    }

    fn connect_failed(&self, endpoint: &SocketAddr) {
        self.open.remove(endpoint);
        self.failed.mark();
    }
}

impl LifecycleObserver for ConnectionMetricsObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::ConnectStart { endpoint, .. } => self.connect_start(*endpoint),
            LifecycleEvent::ConnectEnd { endpoint, .. } => self.connect_end(endpoint),
            LifecycleEvent::ConnectFailed { endpoint, .. } => self.connect_failed(endpoint),
            LifecycleEvent::ConnectionAcquired { .. } => self.acquired.mark(),
            LifecycleEvent::ConnectionReleased { .. } => self.released.mark(),
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "connection-metrics"
    }
}
