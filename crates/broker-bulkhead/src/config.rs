//! Configuration for the bulkhead guard.

use crate::error::ConfigError;
use crate::events::BulkheadEvent;
use crate::kind::{HandlerId, HandlerKind};
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::time::Duration;
use tower_resilience_core::events::{EventListeners, FnListener};

/// Default number of concurrent calls per handler.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default queue limit per handler.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Partial bulkhead settings, as found in broker options or on a single
/// action or event definition.
///
/// Unset fields fall through to the next layer when merged. A
/// `max_queue_size` of zero means the queue is unbounded.
///
/// ```
/// use broker_bulkhead::BulkheadOptions;
///
/// let broker = BulkheadOptions::broker_defaults();
/// let action = BulkheadOptions {
///     enabled: Some(true),
///     concurrency: Some(3),
///     ..Default::default()
/// };
///
/// let merged = broker.merge(&action);
/// assert_eq!(merged.enabled, Some(true));
/// assert_eq!(merged.concurrency, Some(3));
/// assert_eq!(merged.max_queue_size, Some(100));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct BulkheadOptions {
    /// Whether the guard wraps the handler at all.
    pub enabled: Option<bool>,
    /// Maximum number of concurrent calls.
    pub concurrency: Option<usize>,
    /// Maximum number of queued calls; zero means unbounded.
    #[cfg_attr(feature = "serde", serde(alias = "max_queue_size"))]
    pub max_queue_size: Option<usize>,
}

impl BulkheadOptions {
    /// Broker-wide defaults: disabled, 10 concurrent calls, 100 queued calls.
    pub const fn broker_defaults() -> Self {
        Self {
            enabled: Some(false),
            concurrency: Some(DEFAULT_CONCURRENCY),
            max_queue_size: Some(DEFAULT_MAX_QUEUE_SIZE),
        }
    }

    /// Overlays `overrides` on `self`, field by field.
    pub fn merge(self, overrides: &BulkheadOptions) -> Self {
        Self {
            enabled: overrides.enabled.or(self.enabled),
            concurrency: overrides.concurrency.or(self.concurrency),
            max_queue_size: overrides.max_queue_size.or(self.max_queue_size),
        }
    }
}

/// Resolved configuration of one bulkhead.
pub struct BulkheadConfig<K> {
    pub(crate) enabled: bool,
    pub(crate) concurrency: NonZeroUsize,
    pub(crate) max_queue_size: Option<NonZeroUsize>,
    pub(crate) handler: HandlerId,
    pub(crate) node_id: String,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandlerKind> BulkheadConfig<K> {
    /// Creates a new configuration builder.
    pub fn builder() -> BulkheadConfigBuilder<K> {
        BulkheadConfigBuilder::new()
    }
}

impl<K> BulkheadConfig<K> {
    /// Whether the guard is active.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Maximum number of concurrent calls.
    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    /// Queue limit, `None` when unbounded.
    pub fn max_queue_size(&self) -> Option<usize> {
        self.max_queue_size.map(NonZeroUsize::get)
    }

    /// Identity of the guarded handler.
    pub fn handler(&self) -> &HandlerId {
        &self.handler
    }

    /// Node hosting the handler.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl<K> Clone for BulkheadConfig<K> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            concurrency: self.concurrency,
            max_queue_size: self.max_queue_size,
            handler: self.handler.clone(),
            node_id: self.node_id.clone(),
            event_listeners: self.event_listeners.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for BulkheadConfig<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadConfig")
            .field("enabled", &self.enabled)
            .field("concurrency", &self.concurrency)
            .field("max_queue_size", &self.max_queue_size)
            .field("handler", &self.handler)
            .field("node_id", &self.node_id)
            .finish()
    }
}

/// Builder for bulkhead configuration.
pub struct BulkheadConfigBuilder<K> {
    enabled: bool,
    concurrency: usize,
    max_queue_size: usize,
    handler: HandlerId,
    node_id: String,
    event_listeners: EventListeners<BulkheadEvent>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandlerKind> BulkheadConfigBuilder<K> {
    /// Creates a new builder with default values.
    ///
    /// A bulkhead built directly is enabled unless told otherwise; broker
    /// options are disabled by default (see [`BulkheadOptions::broker_defaults`]).
    pub fn new() -> Self {
        Self {
            enabled: true,
            concurrency: DEFAULT_CONCURRENCY,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            handler: HandlerId::default(),
            node_id: String::new(),
            event_listeners: EventListeners::new(),
            _kind: PhantomData,
        }
    }

    /// Enables or disables the guard. A disabled layer returns the handler
    /// unchanged.
    ///
    /// Default: true
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the maximum number of concurrent calls. Must be at least 1.
    ///
    /// Default: 10
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the maximum number of queued calls. Zero means unbounded.
    ///
    /// Default: 100
    pub fn max_queue_size(mut self, max: usize) -> Self {
        self.max_queue_size = max;
        self
    }

    /// Applies every field set in `options`.
    pub fn options(mut self, options: &BulkheadOptions) -> Self {
        if let Some(enabled) = options.enabled {
            self.enabled = enabled;
        }
        if let Some(concurrency) = options.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(max) = options.max_queue_size {
            self.max_queue_size = max;
        }
        self
    }

    /// Sets the name of the guarded handler and its owning service.
    ///
    /// Default: `"bulkhead"` in service `""`
    pub fn handler(mut self, name: impl Into<String>, service: impl Into<String>) -> Self {
        self.handler = HandlerId::new(name, service);
        self
    }

    /// Sets the node identifier reported in queue-full errors.
    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Registers a callback when a call obtains a slot.
    ///
    /// Called with the number of in-flight calls right after the admission,
    /// between 1 and the configured concurrency.
    ///
    /// ```rust
    /// use broker_bulkhead::{Action, BulkheadConfig};
    ///
    /// let layer = BulkheadConfig::<Action>::builder()
    ///     .concurrency(4)
    ///     .on_call_permitted(|in_flight| {
    ///         if in_flight == 4 {
    ///             println!("posts.find is saturated");
    ///         }
    ///     })
    ///     .build();
    /// assert!(layer.is_ok());
    /// ```
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallPermitted { in_flight, .. } = event {
                f(*in_flight);
            }
        }));
        self
    }

    /// Registers a callback when a call has to wait in the queue.
    ///
    /// Called with the queue length including the new call.
    pub fn on_call_queued<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallQueued { queue_len, .. } = event {
                f(*queue_len);
            }
        }));
        self
    }

    /// Registers a callback when a call is rejected because the queue is full.
    ///
    /// Called with the configured queue limit.
    ///
    /// ```rust
    /// use broker_bulkhead::{BulkheadConfig, Event};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// let rejected = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&rejected);
    ///
    /// let layer = BulkheadConfig::<Event>::builder()
    ///     .concurrency(2)
    ///     .max_queue_size(20)
    ///     .on_call_rejected(move |_limit| {
    ///         counter.fetch_add(1, Ordering::SeqCst);
    ///     })
    ///     .build();
    /// assert!(layer.is_ok());
    /// ```
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallRejected { max_queue_size, .. } = event {
                f(*max_queue_size);
            }
        }));
        self
    }

    /// Registers a callback when the handler returns successfully.
    ///
    /// Called with the time the call held its slot.
    pub fn on_call_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallFinished { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Registers a callback when the handler returns an error.
    ///
    /// Called with the time the call held its slot.
    pub fn on_call_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallFailed { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Validates the configuration and returns a [`BulkheadLayer`].
    ///
    /// Fails with [`ConfigError::ZeroConcurrency`] when the concurrency is zero,
    /// even if the guard is disabled.
    ///
    /// [`BulkheadLayer`]: crate::layer::BulkheadLayer
    pub fn build(self) -> Result<crate::layer::BulkheadLayer<K>, ConfigError> {
        let concurrency =
            NonZeroUsize::new(self.concurrency).ok_or_else(|| ConfigError::ZeroConcurrency {
                name: self.handler.name.clone(),
            })?;

        let config = BulkheadConfig {
            enabled: self.enabled,
            concurrency,
            max_queue_size: NonZeroUsize::new(self.max_queue_size),
            handler: self.handler,
            node_id: self.node_id,
            event_listeners: self.event_listeners,
            _kind: PhantomData,
        };
        Ok(crate::layer::BulkheadLayer::new(config))
    }
}

impl<K: HandlerKind> Default for BulkheadConfigBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}
