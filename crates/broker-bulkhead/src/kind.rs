//! Invocation kinds guarded by a bulkhead.
//!
//! A broker dispatches two kinds of local handlers: request-style actions and
//! fire-and-forget events. Both go through the same guard; the kind only
//! decides how the guard names itself in metrics and in capacity errors.

use std::fmt;

/// The kind of handler a bulkhead guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum InvocationKind {
    /// A request/response action.
    Action,
    /// A fire-and-forget event.
    Event,
}

impl InvocationKind {
    /// Returns the lowercase name, also used as the metric label key.
    pub const fn as_str(&self) -> &'static str {
        match self {
            InvocationKind::Action => "action",
            InvocationKind::Event => "event",
        }
    }
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label and metric vocabulary for one invocation kind.
///
/// The guard is generic over this trait so that actions and events share a
/// single state machine. Implemented by [`Action`] and [`Event`].
pub trait HandlerKind: Send + Sync + 'static {
    /// The runtime kind value.
    const KIND: InvocationKind;
    /// Gauge holding the number of in-flight calls.
    const INFLIGHT: &'static str;
    /// Gauge holding the configured concurrency.
    const INFLIGHT_LIMIT: &'static str;
    /// Gauge holding the current queue length.
    const QUEUE_SIZE: &'static str;
    /// Gauge holding the configured queue limit.
    const QUEUE_SIZE_LIMIT: &'static str;
}

/// Marker for action handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Action;

/// Marker for event handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Event;

impl HandlerKind for Action {
    const KIND: InvocationKind = InvocationKind::Action;
    const INFLIGHT: &'static str = "request.bulkhead.inflight";
    const INFLIGHT_LIMIT: &'static str = "request.bulkhead.inflight.limit";
    const QUEUE_SIZE: &'static str = "request.bulkhead.queue.size";
    const QUEUE_SIZE_LIMIT: &'static str = "request.bulkhead.queue.size.limit";
}

impl HandlerKind for Event {
    const KIND: InvocationKind = InvocationKind::Event;
    const INFLIGHT: &'static str = "event.bulkhead.inflight";
    const INFLIGHT_LIMIT: &'static str = "event.bulkhead.inflight.limit";
    const QUEUE_SIZE: &'static str = "event.bulkhead.queue.size";
    const QUEUE_SIZE_LIMIT: &'static str = "event.bulkhead.queue.size.limit";
}

/// Identity of a guarded handler: its name and the full name of its owning
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId {
    /// Action or event name, e.g. `posts.find` or `user.created`.
    pub name: String,
    /// Full name of the owning service, e.g. `v2.posts`.
    pub service: String,
}

impl HandlerId {
    /// Creates a handler identity.
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
        }
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new("bulkhead", "")
    }
}
