//! Error types for the bulkhead guard.
//!
//! Two disjoint classes of error reach a caller of a guarded handler: the
//! guard's own [`BulkheadError`] when the queue is full, and whatever the
//! handler itself returns, passed through unchanged. The handler's error type
//! only needs a `From<BulkheadError>` impl.
//!
//! Two ready-made error types have one:
//! - [`ResilienceError<E>`], shared with the other tower-resilience layers.
//!   A rejection becomes `ResilienceError::BulkheadFull` and loses the
//!   handler identity.
//! - [`GuardError<E>`], which keeps the full [`BulkheadError`].

use crate::kind::InvocationKind;
use std::fmt;
use tower_resilience_core::ResilienceError;

/// Errors raised by the guard itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BulkheadError {
    /// All slots are busy and the wait queue has reached its limit.
    #[error("queue is full: {kind} '{name}' of service '{service}' on node '{node}'")]
    QueueFull {
        /// Kind of the rejected invocation.
        kind: InvocationKind,
        /// Action or event name.
        name: String,
        /// Full name of the owning service.
        service: String,
        /// Identifier of the node hosting the handler.
        node: String,
        /// Concurrency limit of the guard.
        concurrency: usize,
    },
}

impl BulkheadError {
    /// Returns `true` if this is a queue-full rejection.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, BulkheadError::QueueFull { .. })
    }
}

/// Result type for bulkhead operations.
pub type Result<T> = std::result::Result<T, BulkheadError>;

// Conversion to ResilienceError for zero-boilerplate error handling
impl<E> From<BulkheadError> for ResilienceError<E> {
    fn from(err: BulkheadError) -> Self {
        match err {
            BulkheadError::QueueFull { concurrency, .. } => ResilienceError::BulkheadFull {
                concurrent_calls: concurrency,
                max_concurrent: concurrency,
            },
        }
    }
}

/// Errors raised while building a bulkhead configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A guard with no slots would never admit a call.
    #[error("bulkhead concurrency for '{name}' must be at least 1")]
    ZeroConcurrency {
        /// Handler the configuration was built for.
        name: String,
    },
}

/// A handler error type that carries either a guard rejection or the
/// handler's own error.
///
/// Unlike [`ResilienceError`], the rejection keeps the kind, name, service
/// and node of the rejecting handler.
///
/// ```
/// use broker_bulkhead::{BulkheadError, GuardError, InvocationKind};
///
/// #[derive(Debug)]
/// struct DbDown;
///
/// let rejected: GuardError<DbDown> = BulkheadError::QueueFull {
///     kind: InvocationKind::Action,
///     name: "posts.find".into(),
///     service: "posts".into(),
///     node: "node-1".into(),
///     concurrency: 3,
/// }
/// .into();
/// assert!(rejected.is_queue_full());
///
/// let failed: GuardError<DbDown> = GuardError::Handler(DbDown);
/// assert!(failed.handler_error().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError<E> {
    /// Rejected or abandoned by the guard.
    Bulkhead(BulkheadError),
    /// Returned by the guarded handler.
    Handler(E),
}

impl<E> GuardError<E> {
    /// Returns `true` if the guard rejected the call because its queue was full.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, GuardError::Bulkhead(e) if e.is_queue_full())
    }

    /// Returns `true` if the handler produced this error.
    pub fn is_handler(&self) -> bool {
        matches!(self, GuardError::Handler(_))
    }

    /// Borrows the handler error, if any.
    pub fn handler_error(&self) -> Option<&E> {
        match self {
            GuardError::Handler(e) => Some(e),
            GuardError::Bulkhead(_) => None,
        }
    }

    /// Extracts the handler error, if any.
    pub fn into_handler_error(self) -> Option<E> {
        match self {
            GuardError::Handler(e) => Some(e),
            GuardError::Bulkhead(_) => None,
        }
    }
}

impl<E> From<BulkheadError> for GuardError<E> {
    fn from(err: BulkheadError) -> Self {
        GuardError::Bulkhead(err)
    }
}

impl<E> fmt::Display for GuardError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Bulkhead(e) => write!(f, "{}", e),
            GuardError::Handler(e) => write!(f, "handler error: {}", e),
        }
    }
}

impl<E> std::error::Error for GuardError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::Bulkhead(e) => Some(e),
            GuardError::Handler(e) => Some(e),
        }
    }
}
