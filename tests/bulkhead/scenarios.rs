//! Ten calls against a guard with three slots.
//!
//! Each call sleeps `10ms * id`, ids 1 to 10 in arrival order. Time is paused,
//! so the schedule is deterministic.

use super::{Call, Crashed, Flow, TestError, handler};
use broker_bulkhead::{
    Action, Bulkhead, BulkheadError, BulkheadOptions, BulkheadRegistry, Event, GuardError,
    HandlerDefinition, HandlerKind, InvocationKind,
};
use futures::FutureExt;
use tower::util::Either;
use tower::{Service, ServiceExt};

fn options(concurrency: usize, max_queue_size: usize) -> BulkheadOptions {
    BulkheadOptions {
        enabled: Some(true),
        concurrency: Some(concurrency),
        max_queue_size: Some(max_queue_size),
    }
}

fn registry() -> BulkheadRegistry {
    BulkheadRegistry::new("server-1", BulkheadOptions::default())
}

fn guarded_action(
    registry: &BulkheadRegistry,
    flow: &Flow,
    options: BulkheadOptions,
) -> Bulkhead<super::TestHandler, Action> {
    let definition = HandlerDefinition::new("posts.find", "posts").with_bulkhead(options);
    match registry.wrap_action(handler(flow), &definition).unwrap() {
        Either::Left(bulkhead) => bulkhead,
        Either::Right(_) => panic!("bulkhead should be enabled"),
    }
}

fn guarded_event(
    registry: &BulkheadRegistry,
    flow: &Flow,
    options: BulkheadOptions,
) -> Bulkhead<super::TestHandler, Event> {
    let definition = HandlerDefinition::new("user.created", "posts").with_bulkhead(options);
    match registry.wrap_event(handler(flow), &definition).unwrap() {
        Either::Left(bulkhead) => bulkhead,
        Either::Right(_) => panic!("bulkhead should be enabled"),
    }
}

/// Submits the calls in order and spawns each returned future.
async fn submit<K: HandlerKind>(
    service: &mut Bulkhead<super::TestHandler, K>,
    calls: Vec<Call>,
) -> Vec<tokio::task::JoinHandle<Result<u64, TestError>>> {
    let mut handles = Vec::new();
    for call in calls {
        let future = service.ready().await.unwrap().call(call);
        handles.push(tokio::spawn(future));
    }
    handles
}

#[tokio::test(start_paused = true)]
async fn three_run_immediately_and_seven_are_queued() {
    let registry = registry();
    let flow = Flow::default();
    let mut service = guarded_action(&registry, &flow, options(3, 10));

    let calls = (1..=10).map(Call::new).collect();
    let handles = submit(&mut service, calls).await;

    flow.wait_for_invocations(3).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(flow.invoked(), 3);
    assert_eq!(flow.settled(), 0);
    assert_eq!(flow.started(), vec![1, 2, 3]);

    let snapshot = registry
        .snapshot(InvocationKind::Action, "posts", "posts.find")
        .unwrap();
    assert_eq!(snapshot.in_flight, 3);
    assert_eq!(snapshot.queue_len, 7);

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), i as u64 + 1);
    }

    assert_eq!(flow.invoked(), 10);
    assert_eq!(flow.started(), (1..=10).collect::<Vec<_>>());
    assert_eq!(flow.peak(), 3);
    assert_eq!(service.snapshot().in_flight, 0);
    assert_eq!(service.snapshot().queue_len, 0);
}

#[tokio::test(start_paused = true)]
async fn events_queue_like_actions() {
    let registry = registry();
    let flow = Flow::default();
    let mut service = guarded_event(&registry, &flow, options(3, 10));

    let handles = submit(&mut service, (1..=10).map(Call::new).collect()).await;
    flow.wait_for_invocations(3).await;
    assert_eq!(flow.invoked(), 3);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(flow.invoked(), 10);
    assert_eq!(flow.peak(), 3);
}

#[tokio::test(start_paused = true)]
async fn calls_beyond_the_queue_limit_are_rejected() {
    let registry = registry();
    let flow = Flow::default();
    let mut service = guarded_action(&registry, &flow, options(3, 5));

    let mut handles = Vec::new();
    for id in 1..=10 {
        let future = service.ready().await.unwrap().call(Call::new(id));
        if id > 8 {
            // rejected at admission, before anything is polled
            let err = future.now_or_never().expect("rejection is immediate");
            assert_eq!(
                err.unwrap_err(),
                GuardError::Bulkhead(BulkheadError::QueueFull {
                    kind: InvocationKind::Action,
                    name: "posts.find".to_string(),
                    service: "posts".to_string(),
                    node: "server-1".to_string(),
                    concurrency: 3,
                })
            );
        } else {
            handles.push(tokio::spawn(future));
        }
    }

    flow.wait_for_invocations(3).await;
    assert_eq!(service.snapshot().queue_len, 5);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(flow.invoked(), 8);
    assert_eq!(flow.started(), (1..=8).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn handler_failures_reach_their_callers_only() {
    let registry = registry();
    let flow = Flow::default();
    let mut service = guarded_action(&registry, &flow, options(3, 10));

    let calls = (1..=10)
        .map(|id| {
            let call = Call::new(id);
            if id == 2 || id == 8 { call.crashing() } else { call }
        })
        .collect();
    let handles = submit(&mut service, calls).await;

    flow.wait_for_invocations(3).await;
    assert_eq!(flow.invoked(), 3);

    for (i, handle) in handles.into_iter().enumerate() {
        let id = i as u64 + 1;
        match handle.await.unwrap() {
            Ok(value) => {
                assert!(id != 2 && id != 8);
                assert_eq!(value, id);
            }
            Err(err) => assert_eq!(err, GuardError::Handler(Crashed(id))),
        }
    }

    assert_eq!(flow.invoked(), 10);
    assert_eq!(service.snapshot().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn unbounded_queue_never_rejects() {
    let registry = registry();
    let flow = Flow::default();
    let mut service = guarded_action(&registry, &flow, options(1, 0));

    let handles = submit(&mut service, (1..=50).map(Call::new).collect()).await;
    assert_eq!(service.snapshot().queue_len, 49);
    assert_eq!(service.snapshot().max_queue_size, None);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(flow.invoked(), 50);
    assert_eq!(flow.peak(), 1);
}
