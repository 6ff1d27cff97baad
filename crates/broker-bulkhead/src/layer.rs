//! Tower layer implementation for the bulkhead.

use crate::config::BulkheadConfig;
use crate::kind::HandlerKind;
use crate::service::Bulkhead;
use std::fmt;
use std::sync::Arc;
use tower::util::Either;
use tower_layer::Layer;

/// Layer that guards a handler with a bulkhead.
///
/// Layering produces `Either::Left(Bulkhead)` when the configuration is
/// enabled. When it is disabled the handler comes back untouched as
/// `Either::Right(handler)` and no admission state is created.
pub struct BulkheadLayer<K: HandlerKind> {
    config: Arc<BulkheadConfig<K>>,
}

impl<K: HandlerKind> BulkheadLayer<K> {
    /// Creates a new bulkhead layer with the given configuration.
    pub fn new(config: BulkheadConfig<K>) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a new builder for configuring a bulkhead layer.
    ///
    /// Also registers the gauge descriptions when the `metrics` feature is on.
    ///
    /// # Examples
    ///
    /// ```
    /// use broker_bulkhead::{Action, BulkheadLayer};
    ///
    /// let layer = BulkheadLayer::<Action>::builder()
    ///     .handler("posts.find", "posts")
    ///     .concurrency(3)
    ///     .max_queue_size(10)
    ///     .build()
    ///     .unwrap();
    /// assert!(layer.is_enabled());
    /// ```
    pub fn builder() -> crate::BulkheadConfigBuilder<K> {
        crate::metrics::describe_metrics();
        crate::BulkheadConfigBuilder::new()
    }

    /// Whether layering wraps the handler.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The configuration every guard built by this layer uses.
    pub fn config(&self) -> &BulkheadConfig<K> {
        &self.config
    }
}

impl<K: HandlerKind> Clone for BulkheadLayer<K> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
        }
    }
}

impl<K: HandlerKind> fmt::Debug for BulkheadLayer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadLayer")
            .field("config", &self.config)
            .finish()
    }
}

impl<S, K: HandlerKind> Layer<S> for BulkheadLayer<K> {
    type Service = Either<Bulkhead<S, K>, S>;

    fn layer(&self, service: S) -> Self::Service {
        if self.config.enabled {
            Either::Left(Bulkhead::new(service, Arc::clone(&self.config)))
        } else {
            Either::Right(service)
        }
    }
}
