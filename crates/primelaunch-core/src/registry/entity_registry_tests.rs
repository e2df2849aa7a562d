use super::*;
use crate::events::AppEvent;
use crate::test_support::{
    MockEntity, MockFactory, MockSource, STARTING_BLOCK, addr, drain, exception_count, record,
    records,
};
use std::time::Duration;

struct Harness {
    registry: EntityRegistry<MockEntity>,
    source: Arc<MockSource>,
    factory: Arc<MockFactory>,
    bus: EventBus,
    supervisor: TaskSupervisor,
}

fn harness(source: MockSource, factory: MockFactory) -> Harness {
    let bus = EventBus::new(64);
    let source = Arc::new(source);
    let factory = Arc::new(factory);
    let supervisor = TaskSupervisor::new(bus.clone());
    let registry = EntityRegistry::new(
        source.clone(),
        factory.clone(),
        RegistryConfig::new(STARTING_BLOCK),
        bus.clone(),
        supervisor.clone(),
    );
    Harness {
        registry,
        source,
        factory,
        bus,
        supervisor,
    }
}

fn drain_running(supervisor: &TaskSupervisor) -> bool {
    supervisor
        .active_tasks()
        .iter()
        .any(|task| task.name == "lbp-eviction-drain")
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_new_registry_is_lazy() {
    let h = harness(MockSource::with_records(records(3)), MockFactory::new());
    settle().await;

    assert!(h.registry.is_initializing());
    assert!(!h.registry.is_populated());
    assert!(h.registry.is_empty());
    assert_eq!(h.source.factory_calls(), 0);
    assert_eq!(h.source.query_calls(), 0);
}

#[tokio::test]
async fn test_populates_from_starting_block() {
    let h = harness(MockSource::with_records(records(3)), MockFactory::new());

    h.registry.ensure_initialized().await.unwrap();

    assert_eq!(h.source.from_blocks(), vec![STARTING_BLOCK]);
    assert_eq!(h.registry.len(), 3);
    assert!(!h.registry.is_initializing());
    assert!(h.registry.is_populated());
    assert_eq!(h.registry.addresses(), vec![addr(1), addr(2), addr(3)]);

    for entity in h.factory.created() {
        assert!(entity.is_initializing());
    }
    let factory = h.factory.clone();
    eventually(move || factory.created().iter().all(|e| e.init_started())).await;
}

#[tokio::test]
async fn test_concurrent_callers_share_one_scan() {
    let h = harness(
        MockSource::with_records(records(2)).latency(Duration::from_millis(50)),
        MockFactory::new(),
    );

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let registry = h.registry.clone();
            tokio::spawn(async move { registry.ensure_initialized().await })
        })
        .collect();
    h.registry.initialize().await.unwrap();
    for caller in callers {
        caller.await.unwrap().unwrap();
    }

    assert_eq!(h.source.factory_calls(), 1);
    assert_eq!(h.source.query_calls(), 1);
    assert_eq!(h.factory.created().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_map_is_published_atomically() {
    let h = harness(
        MockSource::with_records(records(3)).latency(Duration::from_millis(100)),
        MockFactory::new(),
    );

    let pending = {
        let registry = h.registry.clone();
        tokio::spawn(async move { registry.ensure_initialized().await })
    };
    settle().await;

    assert_eq!(h.source.query_calls(), 1);
    assert!(h.registry.is_initializing());
    assert!(!h.registry.is_populated());
    assert_eq!(h.registry.len(), 0);
    assert!(h.registry.get(&addr(1)).is_none());

    pending.await.unwrap().unwrap();
    assert_eq!(h.registry.len(), 3);
}

#[tokio::test]
async fn test_repeat_calls_do_not_rescan() {
    let h = harness(MockSource::with_records(records(2)), MockFactory::new());

    h.registry.ensure_initialized().await.unwrap();
    h.registry.ensure_initialized().await.unwrap();
    h.registry.initialize().await.unwrap();

    assert_eq!(h.source.query_calls(), 1);
    assert_eq!(h.factory.created().len(), 2);
}

#[tokio::test]
async fn test_empty_deployment_list() {
    let h = harness(MockSource::with_records(Vec::new()), MockFactory::new());

    h.registry.ensure_initialized().await.unwrap();
    h.registry.initialize().await.unwrap();

    assert!(h.registry.is_populated());
    assert!(h.registry.is_empty());
    assert!(!h.registry.is_initializing());
    assert_eq!(h.source.query_calls(), 1);
}

#[tokio::test]
async fn test_discovery_failure_reports_once() {
    let h = harness(MockSource::failing("rpc down"), MockFactory::new());
    let mut rx = h.bus.subscribe();

    let err = h.registry.ensure_initialized().await.unwrap_err();
    assert!(err.to_string().contains("rpc down"));

    assert!(h.registry.is_populated());
    assert!(h.registry.is_empty());
    assert!(!h.registry.is_initializing());

    let events = drain(&mut rx);
    assert_eq!(exception_count(&events), 1);
    match &events[0] {
        AppEvent::Exception(exception) => {
            assert_eq!(exception.message, "Sorry, an error occurred");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_scan_is_not_retried() {
    let h = harness(MockSource::failing("rpc down"), MockFactory::new());
    let mut rx = h.bus.subscribe();

    assert!(h.registry.ensure_initialized().await.is_err());
    h.registry.ensure_initialized().await.unwrap();

    assert!(h.registry.is_populated());
    assert!(h.registry.is_empty());
    assert!(!h.registry.is_initializing());
    assert_eq!(h.source.query_calls(), 1);
    assert_eq!(exception_count(&drain(&mut rx)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_waiter_sees_the_failure() {
    let h = harness(
        MockSource::failing("rpc down").latency(Duration::from_millis(100)),
        MockFactory::new(),
    );
    let mut rx = h.bus.subscribe();

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let registry = h.registry.clone();
            tokio::spawn(async move { registry.ensure_initialized().await })
        })
        .collect();

    for waiter in waiters {
        assert!(waiter.await.unwrap().is_err());
    }
    assert_eq!(h.source.query_calls(), 1);
    assert_eq!(exception_count(&drain(&mut rx)), 1);
}

#[tokio::test]
async fn test_initialize_retries_after_failure() {
    let h = harness(MockSource::failing("rpc down"), MockFactory::new());

    assert!(h.registry.ensure_initialized().await.is_err());
    assert!(h.registry.initialize().await.is_err());

    assert_eq!(h.source.query_calls(), 2);
    assert!(!h.registry.is_initializing());
}

#[tokio::test]
async fn test_corrupt_entity_is_evicted() {
    let h = harness(MockSource::with_records(records(3)), MockFactory::new());
    h.registry.ensure_initialized().await.unwrap();

    h.factory.entity(&addr(2)).corrupt_now();

    // Hidden immediately, removed once the watcher runs.
    assert!(h.registry.get(&addr(2)).is_none());
    assert_eq!(h.registry.len(), 2);

    let registry = h.registry.clone();
    eventually(move || {
        registry.inner.state.read().entities.as_ref().map(HashMap::len) == Some(2)
    })
    .await;
    assert_eq!(h.registry.addresses(), vec![addr(1), addr(3)]);
    assert_eq!(h.source.query_calls(), 1);
}

#[tokio::test]
async fn test_corruption_notice_on_bus_evicts() {
    let h = harness(MockSource::with_records(records(3)), MockFactory::new());
    h.registry.ensure_initialized().await.unwrap();

    h.bus.publish_corrupt(addr(3));

    let registry = h.registry.clone();
    eventually(move || !registry.contains(&addr(3))).await;
    assert_eq!(h.registry.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_eviction_during_scan_is_applied_on_publish() {
    let h = harness(
        MockSource::with_records(records(3)).latency(Duration::from_millis(50)),
        MockFactory::new(),
    );

    let pending = {
        let registry = h.registry.clone();
        tokio::spawn(async move { registry.ensure_initialized().await })
    };
    settle().await;

    h.bus.publish_corrupt(addr(1));
    settle().await;

    pending.await.unwrap().unwrap();
    assert_eq!(h.registry.addresses(), vec![addr(2), addr(3)]);
}

#[tokio::test]
async fn test_full_eviction_does_not_rescan() {
    let h = harness(MockSource::with_records(records(2)), MockFactory::new());
    h.registry.ensure_initialized().await.unwrap();

    for entity in h.factory.created() {
        entity.corrupt_now();
    }
    let registry = h.registry.clone();
    eventually(move || registry.inner.state.read().entities.as_ref().is_some_and(HashMap::is_empty))
        .await;

    h.registry.ensure_initialized().await.unwrap();
    h.registry.initialize().await.unwrap();
    assert!(h.registry.is_empty());
    assert_eq!(h.source.query_calls(), 1);
}

#[tokio::test]
async fn test_rejected_record_is_skipped() {
    let h = harness(
        MockSource::with_records(records(3)),
        MockFactory::new().reject(addr(2)),
    );
    let mut rx = h.bus.subscribe();

    h.registry.ensure_initialized().await.unwrap();

    assert_eq!(h.registry.addresses(), vec![addr(1), addr(3)]);
    let events = drain(&mut rx);
    assert_eq!(exception_count(&events), 1);
    assert!(events.iter().any(|event| matches!(
        event,
        AppEvent::Exception(e) if e.message.contains("Failed to load LBP")
    )));
}

#[tokio::test]
async fn test_duplicate_records_keep_first() {
    let h = harness(
        MockSource::with_records(vec![record(1), record(2), record(1)]),
        MockFactory::new(),
    );

    h.registry.ensure_initialized().await.unwrap();

    assert_eq!(h.registry.addresses(), vec![addr(1), addr(2)]);
    assert_eq!(h.factory.created().len(), 2);
}

#[tokio::test]
async fn test_snapshot_survives_eviction() {
    let h = harness(MockSource::with_records(records(3)), MockFactory::new());
    h.registry.ensure_initialized().await.unwrap();

    let snapshot = h.registry.entities();
    h.factory.entity(&addr(1)).corrupt_now();

    let registry = h.registry.clone();
    eventually(move || registry.len() == 2).await;
    assert_eq!(snapshot.len(), 3);
}

#[tokio::test]
async fn test_ensure_all_initialized_waits_for_entities() {
    let h = harness(
        MockSource::with_records(records(3)),
        MockFactory::new().init_delay(Duration::from_millis(10)),
    );

    h.registry.ensure_all_initialized().await.unwrap();

    for entity in h.factory.created() {
        assert!(!entity.is_initializing());
    }
}

#[tokio::test]
async fn test_ensure_all_initialized_tolerates_corruption() {
    let h = harness(MockSource::with_records(records(3)), MockFactory::new());
    h.registry.ensure_initialized().await.unwrap();

    let waiting = {
        let registry = h.registry.clone();
        tokio::spawn(async move { registry.ensure_all_initialized().await })
    };
    settle().await;

    h.factory.entity(&addr(1)).complete();
    h.factory.entity(&addr(2)).corrupt_now();
    h.factory.entity(&addr(3)).complete();

    waiting.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ensure_all_initialized_propagates_scan_failure() {
    let h = harness(MockSource::failing("rpc down"), MockFactory::new());

    assert!(h.registry.ensure_all_initialized().await.is_err());
}

#[tokio::test]
async fn test_corruption_notice_survives_event_flood() {
    let h = harness(MockSource::with_records(records(3)), MockFactory::new());
    h.registry.ensure_initialized().await.unwrap();

    // Far more events than the bus holds, with no chance for anyone to read.
    h.bus.publish_corrupt(addr(1));
    for _ in 0..200 {
        h.bus.publish_loading(true);
    }

    let registry = h.registry.clone();
    eventually(move || !registry.contains(&addr(1))).await;
    assert_eq!(h.registry.addresses(), vec![addr(2), addr(3)]);
}

#[tokio::test]
async fn test_entity_from_abandoned_scan_cannot_evict_replacement() {
    let h = harness(
        MockSource::with_records(records(3)),
        MockFactory::new().panic_once_on(addr(3)),
    );

    let err = h.registry.initialize().await.unwrap_err();
    assert!(matches!(err, RegistryError::Aborted(_)));
    h.registry.initialize().await.unwrap();
    assert_eq!(h.registry.len(), 3);

    // First scan built 1 and 2 before crashing, the retry built 1, 2 and 3.
    let created = h.factory.created();
    assert_eq!(created.len(), 5);
    let (stale, current) = (&created[0], &created[2]);
    assert_eq!(stale.address(), &addr(1));
    assert_eq!(current.address(), &addr(1));

    stale.corrupt_now();
    settle().await;
    assert!(h.registry.contains(&addr(1)));
    assert_eq!(h.registry.len(), 3);

    current.corrupt_now();
    let registry = h.registry.clone();
    eventually(move || {
        registry.inner.state.read().entities.as_ref().map(HashMap::len) == Some(2)
    })
    .await;
    assert_eq!(h.registry.addresses(), vec![addr(2), addr(3)]);
}

#[tokio::test]
async fn test_dropping_registry_stops_eviction_drain() {
    let h = harness(MockSource::with_records(records(2)), MockFactory::new());
    h.registry.ensure_initialized().await.unwrap();
    assert!(drain_running(&h.supervisor));

    let Harness {
        registry,
        supervisor,
        ..
    } = h;
    drop(registry);

    eventually(move || !drain_running(&supervisor)).await;
}
