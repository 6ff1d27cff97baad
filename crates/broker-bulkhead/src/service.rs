//! Bulkhead service implementation.

use crate::config::BulkheadConfig;
use crate::error::BulkheadError;
use crate::events::BulkheadEvent;
use crate::kind::HandlerKind;
use crate::state::{Admission, BulkheadSnapshot, GuardState};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::ServiceExt;
use tower_service::Service;

#[cfg(feature = "tracing")]
use tracing::warn;

/// A handler guarded by a bulkhead.
///
/// Clones share the same admission state, so every clone counts against the
/// same concurrency and queue limits.
///
/// The slot or queue place is taken in [`Service::call`], but the handler only
/// runs when the returned future is polled. Dropping the future gives the
/// place back without running the handler. Event dispatchers that do not wait
/// for the result must spawn the future rather than drop it:
///
/// ```rust
/// use broker_bulkhead::{BulkheadError, BulkheadLayer, Event};
/// use tower::{Layer, Service, ServiceExt};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let layer = BulkheadLayer::<Event>::builder()
///     .handler("user.created", "mail")
///     .concurrency(2)
///     .build()
///     .unwrap();
/// let mut handler = layer.layer(tower::service_fn(|user: u64| async move {
///     Ok::<_, BulkheadError>(user)
/// }));
///
/// // fire and forget: the spawned task drives the handler to completion
/// let pending = handler.ready().await.unwrap().call(42);
/// let task = tokio::spawn(pending);
/// # assert_eq!(task.await.unwrap().unwrap(), 42);
/// # }
/// ```
pub struct Bulkhead<S, K: HandlerKind> {
    inner: S,
    state: Arc<GuardState<K>>,
}

impl<S, K: HandlerKind> Bulkhead<S, K> {
    /// Creates a new bulkhead service with fresh admission state.
    pub(crate) fn new(inner: S, config: Arc<BulkheadConfig<K>>) -> Self {
        Self {
            inner,
            state: GuardState::new(config),
        }
    }

    /// Returns the current in-flight and queue counts.
    pub fn snapshot(&self) -> BulkheadSnapshot {
        self.state.snapshot()
    }

    /// Returns the configuration this guard was built with.
    pub fn config(&self) -> &BulkheadConfig<K> {
        self.state.config()
    }

    /// Borrows the guarded handler.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Consumes the guard, returning the handler.
    pub fn into_inner(self) -> S {
        self.inner
    }

    pub(crate) fn state(&self) -> &Arc<GuardState<K>> {
        &self.state
    }
}

impl<S: Clone, K: HandlerKind> Clone for Bulkhead<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S, K: HandlerKind> std::fmt::Debug for Bulkhead<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("handler", &self.config().handler)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl<S, K, Request> Service<Request> for Bulkhead<S, K>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: From<BulkheadError> + Send + 'static,
    K: HandlerKind,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Admission happens here rather than in the future, so queue order is
        // the order of `call`.
        let admission = self.state.admit();
        let state = Arc::clone(&self.state);
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let config = state.config();
        match &admission {
            Admission::Rejected(_) => {
                #[cfg(feature = "tracing")]
                warn!(
                    kind = %K::KIND,
                    handler = %config.handler.name,
                    service = %config.handler.service,
                    "bulkhead queue is full, call rejected"
                );

                if !config.event_listeners.is_empty() {
                    config.event_listeners.emit(&BulkheadEvent::CallRejected {
                        handler: config.handler.name.clone(),
                        timestamp: Instant::now(),
                        max_queue_size: config.max_queue_size().unwrap_or_default(),
                    });
                }
            }
            Admission::Queued { queue_len, .. } => {
                if !config.event_listeners.is_empty() {
                    config.event_listeners.emit(&BulkheadEvent::CallQueued {
                        handler: config.handler.name.clone(),
                        timestamp: Instant::now(),
                        queue_len: *queue_len,
                    });
                }
            }
            Admission::Permitted(_) => {}
        }

        Box::pin(async move {
            let mut admission = admission;
            let permit = loop {
                match admission {
                    Admission::Permitted(permit) => break permit,
                    Admission::Queued { waiter, .. } => match waiter.await {
                        Ok(permit) => break permit,
                        // the handoff was dropped without a slot; line up again
                        Err(_) => admission = state.admit(),
                    },
                    Admission::Rejected(err) => return Err(err.into()),
                }
            };

            let config = state.config();
            #[cfg(feature = "tracing")]
            tracing::trace!(
                kind = %K::KIND,
                handler = %config.handler.name,
                in_flight = permit.in_flight(),
                "bulkhead permitted call"
            );
            if !config.event_listeners.is_empty() {
                config.event_listeners.emit(&BulkheadEvent::CallPermitted {
                    handler: config.handler.name.clone(),
                    timestamp: Instant::now(),
                    in_flight: permit.in_flight(),
                });
            }

            let start = Instant::now();
            let result = inner.oneshot(request).await;

            // Release before returning so the next queued call is already
            // running when this caller sees its result.
            drop(permit);

            if !config.event_listeners.is_empty() {
                let duration = start.elapsed();
                let event = match &result {
                    Ok(_) => BulkheadEvent::CallFinished {
                        handler: config.handler.name.clone(),
                        timestamp: Instant::now(),
                        duration,
                    },
                    Err(_) => BulkheadEvent::CallFailed {
                        handler: config.handler.name.clone(),
                        timestamp: Instant::now(),
                        duration,
                    },
                };
                config.event_listeners.emit(&event);
            }

            result
        })
    }
}
