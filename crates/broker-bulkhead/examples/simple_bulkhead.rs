use broker_bulkhead::{Action, BulkheadConfig, BulkheadError};
use std::time::Duration;
use tower::{Service, ServiceBuilder, ServiceExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Simple Bulkhead Example\n");

    // At most 2 concurrent calls of `greeter.hello`, 5 more may wait
    let layer = BulkheadConfig::<Action>::builder()
        .handler("greeter.hello", "greeter")
        .concurrency(2)
        .max_queue_size(5)
        .build()?;

    // Create a simple handler
    let handler = tower::service_fn(|name: String| async move {
        println!("Processing: {}", name);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, BulkheadError>(format!("Hello, {}", name))
    });

    let mut service = ServiceBuilder::new().layer(layer).service(handler);

    for name in ["alice", "bob", "carol"] {
        let response = service.ready().await?.call(name.to_string()).await?;
        println!("{}", response);
    }

    println!("\nAll requests completed!");
    Ok(())
}
