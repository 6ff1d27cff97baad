//! Per-handler bulkhead for service brokers.
//!
//! A bulkhead limits how many invocations of one handler run at the same
//! time. Calls beyond the limit wait in a FIFO queue; once the queue reaches
//! its own limit, further calls are rejected straight away with
//! [`BulkheadError::QueueFull`] and the handler never sees them. Errors
//! returned by the handler pass through untouched.
//!
//! Every guarded handler gets its own state. Nothing is shared between
//! handlers, even handlers of the same service.
//!
//! # Basic Example
//!
//! ```rust
//! use broker_bulkhead::{Action, BulkheadLayer, GuardError};
//! use tower::{Layer, Service, ServiceExt};
//! use tower::util::Either;
//!
//! # async fn example() -> Result<(), GuardError<std::io::Error>> {
//! let layer = BulkheadLayer::<Action>::builder()
//!     .handler("posts.find", "posts")
//!     .node_id("node-1")
//!     .concurrency(3)
//!     .max_queue_size(10)
//!     .build()
//!     .expect("concurrency is positive");
//!
//! let mut handler = layer.layer(tower::service_fn(|id: u64| async move {
//!     Ok::<_, GuardError<std::io::Error>>(format!("post {}", id))
//! }));
//! assert!(matches!(handler, Either::Left(_)));
//!
//! let post = handler.ready().await?.call(7).await?;
//! assert_eq!(post, "post 7");
//! # Ok(())
//! # }
//! ```
//!
//! # Broker Integration
//!
//! A [`BulkheadRegistry`] holds the broker-wide defaults and the local node
//! id. The runtime hands it each local action or event handler as it is
//! registered; per-handler options override the defaults field by field.
//!
//! ```rust
//! use broker_bulkhead::{BulkheadOptions, BulkheadRegistry, HandlerDefinition, InvocationKind};
//!
//! let registry = BulkheadRegistry::new(
//!     "node-1",
//!     BulkheadOptions { enabled: Some(true), ..Default::default() },
//! );
//!
//! let handler = tower::service_fn(|name: String| async move {
//!     Ok::<_, broker_bulkhead::BulkheadError>(name.len())
//! });
//! let definition = HandlerDefinition::new("user.created", "mail").with_bulkhead(
//!     BulkheadOptions { concurrency: Some(2), ..Default::default() },
//! );
//! let _guarded = registry.wrap_event(handler, &definition).unwrap();
//!
//! let snapshot = registry.snapshot(InvocationKind::Event, "mail", "user.created").unwrap();
//! assert_eq!(snapshot.concurrency, 2);
//! assert_eq!(snapshot.max_queue_size, Some(100));
//! ```
//!
//! # Feature Flags
//!
//! - `metrics`: sets four gauges per guard on every admission, rejection,
//!   completion and drain (see [`metrics`](crate::metrics))
//! - `tracing`: logs queueing, draining and rejections
//! - `serde`: `Serialize`/`Deserialize` for [`BulkheadOptions`]

pub mod config;
pub mod error;
pub mod events;
pub mod kind;
pub mod layer;
pub mod metrics;
pub mod registry;
pub mod service;
mod state;

pub use config::{BulkheadConfig, BulkheadConfigBuilder, BulkheadOptions};
pub use error::{BulkheadError, ConfigError, GuardError, Result};
pub use events::BulkheadEvent;
pub use kind::{Action, Event, HandlerId, HandlerKind, InvocationKind};
pub use layer::BulkheadLayer;
pub use metrics::describe_metrics;
pub use registry::{BulkheadRegistry, GuardKey, HandlerDefinition};
pub use service::Bulkhead;
pub use state::BulkheadSnapshot;
