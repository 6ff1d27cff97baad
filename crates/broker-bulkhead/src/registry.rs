//! Broker-side hooks that guard local actions and events.
//!
//! The runtime calls [`BulkheadRegistry::wrap_action`] when it registers a
//! local action and [`BulkheadRegistry::wrap_event`] when it registers a local
//! event handler. Each call merges the broker defaults with the handler's own
//! options, builds a guard with fresh state and remembers it under the
//! handler's identity so it can be inspected and torn down later.

use crate::config::{BulkheadConfig, BulkheadOptions};
use crate::error::ConfigError;
use crate::kind::{Action, Event, HandlerId, HandlerKind, InvocationKind};
use crate::service::Bulkhead;
use crate::state::{BulkheadSnapshot, GuardState};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tower::util::Either;
use tower_layer::Layer;

#[cfg(feature = "tracing")]
use tracing::debug;

/// An action or event as declared by its service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDefinition {
    /// Identity of the handler.
    pub id: HandlerId,
    /// Handler-level bulkhead options, overriding the broker defaults.
    pub bulkhead: BulkheadOptions,
}

impl HandlerDefinition {
    /// Creates a definition with no handler-level options.
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            id: HandlerId::new(name, service),
            bulkhead: BulkheadOptions::default(),
        }
    }

    /// Sets the handler-level bulkhead options.
    pub fn with_bulkhead(mut self, options: BulkheadOptions) -> Self {
        self.bulkhead = options;
        self
    }
}

/// Key under which a guard is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardKey {
    /// Kind of the guarded handler.
    pub kind: InvocationKind,
    /// Full name of the owning service.
    pub service: String,
    /// Action or event name.
    pub name: String,
}

impl GuardKey {
    /// Creates a key.
    pub fn new(kind: InvocationKind, service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            service: service.into(),
            name: name.into(),
        }
    }
}

trait Inspect: Send + Sync {
    fn snapshot(&self) -> BulkheadSnapshot;
}

impl<K: HandlerKind> Inspect for GuardState<K> {
    fn snapshot(&self) -> BulkheadSnapshot {
        GuardState::snapshot(self)
    }
}

/// Builds and tracks the bulkheads of one broker node.
pub struct BulkheadRegistry {
    defaults: BulkheadOptions,
    node_id: String,
    guards: Mutex<HashMap<GuardKey, Arc<dyn Inspect>>>,
}

impl BulkheadRegistry {
    /// Creates a registry for `node_id` using `defaults` as the broker-wide
    /// options. Unset fields fall back to [`BulkheadOptions::broker_defaults`].
    pub fn new(node_id: impl Into<String>, defaults: BulkheadOptions) -> Self {
        crate::metrics::describe_metrics();
        Self {
            defaults: BulkheadOptions::broker_defaults().merge(&defaults),
            node_id: node_id.into(),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// The merged broker-wide options.
    pub fn defaults(&self) -> &BulkheadOptions {
        &self.defaults
    }

    /// The node identifier reported in queue-full errors.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Guards a local action handler.
    ///
    /// Returns the handler unchanged (`Either::Right`) when the merged options
    /// leave the bulkhead disabled.
    pub fn wrap_action<S>(
        &self,
        handler: S,
        definition: &HandlerDefinition,
    ) -> Result<Either<Bulkhead<S, Action>, S>, ConfigError> {
        self.wrap::<S, Action>(handler, definition)
    }

    /// Guards a local event handler.
    ///
    /// Returns the handler unchanged (`Either::Right`) when the merged options
    /// leave the bulkhead disabled.
    pub fn wrap_event<S>(
        &self,
        handler: S,
        definition: &HandlerDefinition,
    ) -> Result<Either<Bulkhead<S, Event>, S>, ConfigError> {
        self.wrap::<S, Event>(handler, definition)
    }

    fn wrap<S, K: HandlerKind>(
        &self,
        handler: S,
        definition: &HandlerDefinition,
    ) -> Result<Either<Bulkhead<S, K>, S>, ConfigError> {
        let options = self.defaults.merge(&definition.bulkhead);
        let layer = BulkheadConfig::<K>::builder()
            .handler(definition.id.name.clone(), definition.id.service.clone())
            .node_id(self.node_id.clone())
            .options(&options)
            .build()?;

        let key = GuardKey::new(K::KIND, &definition.id.service, &definition.id.name);
        let wrapped = layer.layer(handler);
        let mut guards = self.guards.lock();
        match &wrapped {
            Either::Left(bulkhead) => {
                #[cfg(feature = "tracing")]
                debug!(
                    kind = %K::KIND,
                    handler = %definition.id.name,
                    service = %definition.id.service,
                    concurrency = layer.config().concurrency(),
                    max_queue_size = ?layer.config().max_queue_size(),
                    "bulkhead enabled"
                );
                let state: Arc<dyn Inspect> = Arc::clone(bulkhead.state()) as Arc<dyn Inspect>;
                guards.insert(key, state);
            }
            Either::Right(_) => {
                guards.remove(&key);
            }
        }
        Ok(wrapped)
    }

    /// Returns the current counts of a registered guard.
    pub fn snapshot(
        &self,
        kind: InvocationKind,
        service: &str,
        name: &str,
    ) -> Option<BulkheadSnapshot> {
        let key = GuardKey::new(kind, service, name);
        self.guards.lock().get(&key).map(|state| state.snapshot())
    }

    /// Returns the current counts of every registered guard.
    pub fn snapshots(&self) -> Vec<(GuardKey, BulkheadSnapshot)> {
        self.guards
            .lock()
            .iter()
            .map(|(key, state)| (key.clone(), state.snapshot()))
            .collect()
    }

    /// Forgets the guard of an unregistered handler. Returns `false` if none
    /// was registered.
    ///
    /// Clones of the wrapped handler that are still alive keep working with
    /// their own state until dropped.
    pub fn unregister(&self, kind: InvocationKind, service: &str, name: &str) -> bool {
        let key = GuardKey::new(kind, service, name);
        self.guards.lock().remove(&key).is_some()
    }

    /// Number of registered guards.
    pub fn len(&self) -> usize {
        self.guards.lock().len()
    }

    /// Returns `true` if no guard is registered.
    pub fn is_empty(&self) -> bool {
        self.guards.lock().is_empty()
    }
}

impl Default for BulkheadRegistry {
    fn default() -> Self {
        Self::new("", BulkheadOptions::default())
    }
}

impl fmt::Debug for BulkheadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadRegistry")
            .field("node_id", &self.node_id)
            .field("defaults", &self.defaults)
            .field("guards", &self.len())
            .finish()
    }
}
