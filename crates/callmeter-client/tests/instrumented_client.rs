#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use callmeter_client::engine::HttpEngine;
use callmeter_client::{config, InstrumentedClient};
use callmeter_core::event::EventKind;
use callmeter_core::{LifecycleEvent, LifecycleObserver, MetricRegistry, MetricSink};

use support::{call, endpoint, CollectingFaults, FakeCache, FakeEngine, PanickingObserver, RecordingObserver};

fn gauge(registry: &MetricRegistry, name: &str) -> f64 {
    registry.get_gauge(name).unwrap().value()
}

fn meter(registry: &MetricRegistry, name: &str) -> u64 {
    registry.get_meter(name).unwrap().count()
}

#[tokio::test]
async fn metric_ids_follow_prefix_and_name() {
    let registry = MetricRegistry::new();

    let named = InstrumentedClient::new(&registry, FakeEngine::default(), Some("github")).unwrap();
    assert_eq!(named.metric_id("connection-setup"), "http-client.github.connection-setup");

    let anonymous = InstrumentedClient::new(&registry, FakeEngine::default(), None).unwrap();
    assert_eq!(anonymous.metric_id("connection-setup"), "http-client.connection-setup");

    let custom = InstrumentedClient::<FakeEngine>::builder(&registry)
        .prefix("svc")
        .name("")
        .build(FakeEngine::default())
        .unwrap();
    assert_eq!(custom.metric_id("calls-end"), "svc.calls-end");
}

#[tokio::test]
async fn events_reach_every_observer() {
    let registry = MetricRegistry::new();
    let user = Arc::new(RecordingObserver::default());
    let extra = Arc::new(RecordingObserver::default());
    let engine = FakeEngine::default().with_observer(user.clone());

    let client = InstrumentedClient::<FakeEngine>::builder(&registry)
        .name("api")
        .observer(extra.clone())
        .build(engine)
        .unwrap();
    assert_eq!(client.multiplexer().len(), 4);

    let c = call(1);
    let ep = endpoint(443);
    client.emit(LifecycleEvent::CallStart { call: c });
    client.emit(LifecycleEvent::ConnectStart { call: c, endpoint: ep });
    client.emit(LifecycleEvent::ConnectEnd { call: c, endpoint: ep, protocol: None });
    client.emit(LifecycleEvent::CallEnd { call: c });

    let expected = vec![
        EventKind::CallStart,
        EventKind::ConnectStart,
        EventKind::ConnectEnd,
        EventKind::CallEnd,
    ];
    assert_eq!(user.kinds(), expected);
    assert_eq!(extra.kinds(), expected);

    assert_eq!(meter(&registry, &client.metric_id("connection-requests")), 1);
    assert_eq!(
        registry.get_histogram(&client.metric_id("connection-setup")).unwrap().count(),
        1
    );
    assert_eq!(meter(&registry, &client.metric_id("calls-end")), 1);
    assert_eq!(client.call_observer().unwrap().open_phases(), 0);
}

#[tokio::test]
async fn faulty_observer_does_not_break_metrics() {
    let registry = MetricRegistry::new();
    let faults = Arc::new(CollectingFaults::default());
    let client = InstrumentedClient::<FakeEngine>::builder(&registry)
        .observer(Arc::new(PanickingObserver))
        .fault_reporter(faults.clone())
        .build(FakeEngine::default())
        .unwrap();

    client.emit(LifecycleEvent::CallStart { call: call(1) });
    client.emit(LifecycleEvent::CallEnd { call: call(1) });

    assert_eq!(faults.faults.lock().len(), 2);
    assert_eq!(meter(&registry, &client.metric_id("calls-end")), 1);
}

#[tokio::test]
async fn default_fault_reporter_counts_faults() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let registry = MetricRegistry::new();
    let client = InstrumentedClient::<FakeEngine>::builder(&registry)
        .observer(Arc::new(PanickingObserver))
        .build(FakeEngine::default())
        .unwrap();

    client.emit(LifecycleEvent::CallStart { call: call(1) });
    assert_eq!(meter(&registry, &client.metric_id("observer-faults")), 1);
}

#[tokio::test]
async fn dispatched_calls_are_metered() {
    let registry = MetricRegistry::new();
    let client = InstrumentedClient::new(&registry, FakeEngine::default(), None).unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    client
        .enqueue(async move {
            let _ = tx.send(());
        })
        .unwrap();
    rx.await.unwrap();

    assert_eq!(meter(&registry, "http-client.network-requests-submitted"), 1);
    assert_eq!(client.task_metrics().submitted(), 1);
    for _ in 0..200 {
        if client.task_metrics().completed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(client.task_metrics().completed(), 1);
    assert_eq!(client.task_metrics().running(), 0);
}

#[tokio::test]
async fn pool_and_dispatcher_gauges() {
    let registry = MetricRegistry::new();
    let client = InstrumentedClient::new(&registry, FakeEngine::default(), Some("g")).unwrap();

    client.pool.total.store(7, Ordering::Relaxed);
    client.pool.idle.store(3, Ordering::Relaxed);
    client.pool.multiplexed.store(2, Ordering::Relaxed);
    client.dispatcher.queued.store(4, Ordering::Relaxed);
    client.dispatcher.running.store(1, Ordering::Relaxed);

    assert_eq!(gauge(&registry, "http-client.g.connection-pool-count"), 7.0);
    assert_eq!(gauge(&registry, "http-client.g.connection-pool-count-idle"), 3.0);
    assert_eq!(gauge(&registry, "http-client.g.connection-pool-count-multiplexed"), 2.0);
    assert_eq!(gauge(&registry, "http-client.g.queued-network-requests"), 4.0);
    assert_eq!(gauge(&registry, "http-client.g.running-network-requests"), 1.0);
    assert_eq!(client.queued_calls(), 4);

    // No cache, no cache gauges.
    assert!(registry.get_gauge("http-client.g.cache-hit-count").is_none());
}

#[tokio::test]
async fn cache_gauges() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let registry = MetricRegistry::new();
    let cache = FakeCache::default();
    cache.requests.store(10, Ordering::Relaxed);
    cache.hits.store(6, Ordering::Relaxed);
    cache.network.store(4, Ordering::Relaxed);
    cache.size.store(256, Ordering::Relaxed);
    cache.max_size.store(1024, Ordering::Relaxed);

    let client =
        InstrumentedClient::new(&registry, FakeEngine::default().with_cache(cache), None).unwrap();

    assert_eq!(gauge(&registry, "http-client.cache-request-count"), 10.0);
    assert_eq!(gauge(&registry, "http-client.cache-hit-count"), 6.0);
    assert_eq!(gauge(&registry, "http-client.cache-network-count"), 4.0);
    assert_eq!(gauge(&registry, "http-client.cache-write-success-count"), 0.0);
    assert_eq!(gauge(&registry, "http-client.cache-current-size"), 256.0);
    assert_eq!(gauge(&registry, "http-client.cache-max-size"), 1024.0);
    assert_eq!(gauge(&registry, "http-client.cache-size"), 0.25);

    let cache = client.cache.as_ref().unwrap();
    cache.size_fails.store(true, Ordering::Relaxed);
    assert_eq!(gauge(&registry, "http-client.cache-current-size"), -1.0);

    cache.max_size.store(0, Ordering::Relaxed);
    assert!(gauge(&registry, "http-client.cache-size").is_nan());
}

#[tokio::test]
async fn into_inner_restores_and_rewrap_reuses_ids() {
    let registry = MetricRegistry::new();
    let user = Arc::new(RecordingObserver::default());
    let engine = FakeEngine::default().with_observer(user.clone());
    let original_executor = engine.executor();

    let client = InstrumentedClient::new(&registry, engine, Some("github")).unwrap();
    let names = registry.names();

    let engine = client.into_inner();
    assert_eq!(engine.event_observer().unwrap().name(), "recording");
    assert!(Arc::ptr_eq(&engine.executor(), &original_executor));

    let client = InstrumentedClient::new(&registry, engine, Some("github")).unwrap();
    assert_eq!(registry.names(), names);
    assert_eq!(client.multiplexer().len(), 3);

    // Gauges from the first wrap still read the live pool.
    client.pool.total.store(9, Ordering::Relaxed);
    assert_eq!(gauge(&registry, "http-client.github.connection-pool-count"), 9.0);

    client.emit(LifecycleEvent::CallStart { call: call(5) });
    assert_eq!(user.kinds(), vec![EventKind::CallStart]);
}

#[tokio::test]
async fn name_collision_fails_construction() {
    let registry = MetricRegistry::new();
    registry.counter("http-client.connection-requests").unwrap();

    let err = InstrumentedClient::new(&registry, FakeEngine::default(), None)
        .err()
        .expect("collision must fail");
    assert_eq!(err.kind().as_str(), "SINK_CONFLICT");
    assert!(err.to_string().contains("http-client.connection-requests"));
    assert_eq!(registry.names(), vec!["http-client.connection-requests".to_string()]);
}

#[tokio::test]
async fn failed_build_registers_nothing() {
    let cases: [(&str, fn(&MetricRegistry, &str)); 3] = [
        ("http-client.network-requests-rejected", |r, n| {
            r.counter(n).unwrap();
        }),
        ("http-client.calls-duration", |r, n| {
            r.meter(n).unwrap();
        }),
        ("http-client.running-network-requests", |r, n| {
            r.meter(n).unwrap();
        }),
    ];
    for (taken, claim) in cases {
        let registry = MetricRegistry::new();
        claim(&registry, taken);
        let before = registry.names();

        let err = InstrumentedClient::new(&registry, FakeEngine::default(), None)
            .err()
            .expect("collision must fail");

        assert_eq!(err.kind().as_str(), "SINK_CONFLICT", "{taken}");
        assert_eq!(registry.names(), before, "{taken}");
    }
}

#[tokio::test]
async fn failed_build_returns_the_engine() {
    let registry = MetricRegistry::new();
    registry.counter("http-client.cache-hit-count").unwrap();
    let user = Arc::new(RecordingObserver::default());
    let engine = FakeEngine::default()
        .with_cache(FakeCache::default())
        .with_observer(user.clone());
    let executor = engine.executor();

    let err = InstrumentedClient::new(&registry, engine, None)
        .err()
        .expect("collision must fail");
    assert_eq!(err.kind().as_str(), "SINK_CONFLICT");

    let engine = err.into_engine();
    let observer = engine.event_observer().expect("observer kept");
    assert_eq!(Arc::as_ptr(&observer) as *const (), Arc::as_ptr(&user) as *const ());
    assert_eq!(
        Arc::as_ptr(&engine.executor()) as *const (),
        Arc::as_ptr(&executor) as *const ()
    );

    // Nothing left registered, so a second attempt under another name works.
    engine.emit(LifecycleEvent::CallStart { call: call(1) });
    assert_eq!(user.kinds(), vec![EventKind::CallStart]);
    let client = InstrumentedClient::new(&registry, engine, Some("retry")).unwrap();
    assert_eq!(client.multiplexer().len(), 3);
}

#[tokio::test]
async fn build_error_converts_for_question_mark() {
    fn wrap(registry: &MetricRegistry) -> callmeter_core::Result<InstrumentedClient<FakeEngine>> {
        Ok(InstrumentedClient::new(registry, FakeEngine::default(), None)?)
    }

    let registry = MetricRegistry::new();
    registry.timer("http-client.observer-faults").unwrap();
    let err = wrap(&registry).err().expect("collision must fail");
    assert_eq!(err.kind().as_str(), "SINK_CONFLICT");
}

#[tokio::test]
async fn config_drives_the_builder() {
    let cfg = config::load_from_str(
        r#"
version: 1
client:
  prefix: "svc"
  name: "billing"
observers:
  connections: false
metrics:
  significant_figures: 2
"#,
    )
    .unwrap();
    let registry = cfg.registry().unwrap();

    let client = InstrumentedClient::<FakeEngine>::builder(&registry)
        .config(&cfg)
        .build(FakeEngine::default())
        .unwrap();

    assert_eq!(client.metric_id("x"), "svc.billing.x");
    assert!(client.connection_observer().is_none());
    assert!(client.call_observer().is_some());
    assert!(registry.get_meter("svc.billing.connection-requests").is_none());
    assert!(registry.get_meter("svc.billing.calls-start").is_some());
}

#[tokio::test]
async fn build_default_constructs_the_engine() {
    let registry = MetricRegistry::new();
    let client = InstrumentedClient::<FakeEngine>::builder(&registry)
        .build_default::<FakeEngine>()
        .unwrap();
    assert!(client.event_observer().is_some());
}

#[test]
fn closure_observer_is_accepted() {
    let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    let obs: Arc<dyn LifecycleObserver> = Arc::new(move |_: &LifecycleEvent| {
        s.fetch_add(1, Ordering::Relaxed);
    });
    obs.on_event(&LifecycleEvent::CallStart { call: call(1) });
    assert_eq!(seen.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn snapshot_reports_wired_metrics() {
    let registry = MetricRegistry::new();
    let client = InstrumentedClient::new(&registry, FakeEngine::default(), Some("snap")).unwrap();
    client.pool.total.store(2, Ordering::Relaxed);
    client.emit(LifecycleEvent::CallStart { call: call(1) });
    client.emit(LifecycleEvent::CallEnd { call: call(1) });

    let json = serde_json::to_value(registry.snapshot()).unwrap();
    let metrics = &json["metrics"];
    assert_eq!(metrics["http-client.snap.connection-pool-count"]["type"], "gauge");
    assert_eq!(metrics["http-client.snap.connection-pool-count"]["value"], 2.0);
    assert_eq!(metrics["http-client.snap.calls-end"]["type"], "meter");
    assert_eq!(metrics["http-client.snap.calls-end"]["count"], 1);
    assert_eq!(metrics["http-client.snap.calls-duration"]["type"], "timer");
}
