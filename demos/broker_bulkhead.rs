//! Registry example: one broker, one action and one event handler.
//! Run with: cargo run --example broker_bulkhead

use broker_bulkhead::{
    BulkheadError, BulkheadOptions, BulkheadRegistry, HandlerDefinition, InvocationKind,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tower::{Service, ServiceExt};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug)]
enum ExampleError {
    Bulkhead(BulkheadError),
}

impl std::fmt::Display for ExampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExampleError::Bulkhead(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExampleError {}

impl From<BulkheadError> for ExampleError {
    fn from(e: BulkheadError) -> Self {
        ExampleError::Bulkhead(e)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    // Broker-wide defaults: 3 concurrent calls, 4 queued, per handler
    let registry = BulkheadRegistry::new(
        "node-1",
        BulkheadOptions {
            enabled: Some(true),
            concurrency: Some(3),
            max_queue_size: Some(4),
        },
    );

    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));
    let (c, m) = (Arc::clone(&concurrent), Arc::clone(&max_observed));

    let find = tower::service_fn(move |id: u32| {
        let concurrent = Arc::clone(&c);
        let max = Arc::clone(&m);
        async move {
            let current = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(current, Ordering::SeqCst);
            sleep(Duration::from_millis(100)).await;
            concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, ExampleError>(format!("post #{}", id))
        }
    });
    let mut find = registry.wrap_action(find, &HandlerDefinition::new("posts.find", "posts"))?;

    // The event handler opts out of the broker-wide bulkhead
    let created = tower::service_fn(|id: u32| async move {
        println!("user {} created", id);
        Ok::<_, ExampleError>(())
    });
    let created = registry.wrap_event(
        created,
        &HandlerDefinition::new("user.created", "mail").with_bulkhead(BulkheadOptions {
            enabled: Some(false),
            ..Default::default()
        }),
    )?;

    println!("Sending 10 calls to posts.find (3 run, 4 wait, 3 rejected)...\n");
    let mut handles = vec![];
    for i in 0..10 {
        // admission happens in `call`, so the queue keeps this loop's order
        let call = find.ready().await?.call(i);
        handles.push(tokio::spawn(call));
    }

    sleep(Duration::from_millis(10)).await;
    if let Some(snapshot) = registry.snapshot(InvocationKind::Action, "posts", "posts.find") {
        println!(
            "posts.find: {} in flight, {} queued\n",
            snapshot.in_flight, snapshot.queue_len
        );
    }

    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await? {
            Ok(post) => println!("Call {} returned {}", i, post),
            Err(e) => println!("Call {} failed: {}", i, e),
        }
    }

    created.oneshot(7).await?;

    println!(
        "\nMax concurrent observed: {}",
        max_observed.load(Ordering::SeqCst)
    );
    Ok(())
}
