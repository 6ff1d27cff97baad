use super::{Call, Flow, handler};
use broker_bulkhead::{BulkheadOptions, BulkheadRegistry, HandlerDefinition, InvocationKind};
use std::sync::Arc;
use tower::ServiceExt;
use tower::util::Either;

fn enabled() -> BulkheadOptions {
    BulkheadOptions {
        enabled: Some(true),
        concurrency: Some(2),
        max_queue_size: Some(5),
    }
}

#[test]
fn disabled_handler_is_returned_as_is() {
    let registry = BulkheadRegistry::new("node-1", BulkheadOptions::default());
    let handler = Arc::new(String::from("posts.find"));

    let wrapped = registry
        .wrap_action(Arc::clone(&handler), &HandlerDefinition::new("posts.find", "posts"))
        .unwrap();
    match wrapped {
        Either::Right(same) => assert!(Arc::ptr_eq(&same, &handler)),
        Either::Left(_) => panic!("disabled handlers must not be wrapped"),
    }
    assert!(registry.is_empty());
}

#[test]
fn handler_can_opt_out_of_broker_wide_bulkhead() {
    let registry = BulkheadRegistry::new("node-1", enabled());
    let definition = HandlerDefinition::new("user.created", "mail").with_bulkhead(
        BulkheadOptions {
            enabled: Some(false),
            ..Default::default()
        },
    );
    let wrapped = registry.wrap_event((), &definition).unwrap();
    assert!(matches!(wrapped, Either::Right(())));
}

#[test]
fn re_registering_replaces_the_guard() {
    let registry = BulkheadRegistry::new("node-1", enabled());
    let definition = HandlerDefinition::new("posts.find", "posts");
    let _first = registry.wrap_action((), &definition).unwrap();
    let _second = registry
        .wrap_action(
            (),
            &definition.clone().with_bulkhead(BulkheadOptions {
                concurrency: Some(9),
                ..Default::default()
            }),
        )
        .unwrap();

    assert_eq!(registry.len(), 1);
    let snapshot = registry
        .snapshot(InvocationKind::Action, "posts", "posts.find")
        .unwrap();
    assert_eq!(snapshot.concurrency, 9);

    // disabling on re-registration drops the old entry
    let _third = registry
        .wrap_action(
            (),
            &definition.with_bulkhead(BulkheadOptions {
                enabled: Some(false),
                ..Default::default()
            }),
        )
        .unwrap();
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn registry_reports_live_counts() {
    let registry = BulkheadRegistry::new("node-1", enabled());
    let flow = Flow::default();
    let wrapped = registry
        .wrap_action(handler(&flow), &HandlerDefinition::new("posts.find", "posts"))
        .unwrap();

    let mut handles = Vec::new();
    for id in 1..=4 {
        handles.push(tokio::spawn(wrapped.clone().oneshot(Call::new(id))));
    }
    flow.wait_for_invocations(2).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let (key, snapshot) = registry.snapshots().pop().unwrap();
    assert_eq!(key.kind, InvocationKind::Action);
    assert_eq!(key.name, "posts.find");
    assert_eq!(snapshot.in_flight, 2);
    assert_eq!(snapshot.queue_len, 2);
    assert_eq!(snapshot.max_queue_size, Some(5));

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let snapshot = registry
        .snapshot(InvocationKind::Action, "posts", "posts.find")
        .unwrap();
    assert_eq!(snapshot.in_flight, 0);
    assert_eq!(snapshot.queue_len, 0);

    assert!(registry.unregister(InvocationKind::Action, "posts", "posts.find"));
    assert!(
        registry
            .snapshot(InvocationKind::Action, "posts", "posts.find")
            .is_none()
    );
}
