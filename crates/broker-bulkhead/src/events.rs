//! Events emitted by a bulkhead.
//!
//! Listeners are registered on the config builder and called synchronously,
//! outside the guard's lock.

use std::time::{Duration, Instant};
use tower_resilience_core::events::ResilienceEvent;

/// Events emitted by a bulkhead guard.
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// A call obtained a slot, either directly or after waiting in the queue.
    CallPermitted {
        /// Name of the guarded handler.
        handler: String,
        /// When the event occurred.
        timestamp: Instant,
        /// In-flight calls right after this one was admitted.
        in_flight: usize,
    },
    /// All slots were busy and the call was queued.
    CallQueued {
        /// Name of the guarded handler.
        handler: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Queue length including this call.
        queue_len: usize,
    },
    /// The queue was full and the call was rejected.
    CallRejected {
        /// Name of the guarded handler.
        handler: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Configured queue limit.
        max_queue_size: usize,
    },
    /// The handler returned successfully.
    CallFinished {
        /// Name of the guarded handler.
        handler: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Time spent holding the slot.
        duration: Duration,
    },
    /// The handler returned an error.
    CallFailed {
        /// Name of the guarded handler.
        handler: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Time spent holding the slot.
        duration: Duration,
    },
}

impl ResilienceEvent for BulkheadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BulkheadEvent::CallPermitted { .. } => "call_permitted",
            BulkheadEvent::CallQueued { .. } => "call_queued",
            BulkheadEvent::CallRejected { .. } => "call_rejected",
            BulkheadEvent::CallFinished { .. } => "call_finished",
            BulkheadEvent::CallFailed { .. } => "call_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BulkheadEvent::CallPermitted { timestamp, .. }
            | BulkheadEvent::CallQueued { timestamp, .. }
            | BulkheadEvent::CallRejected { timestamp, .. }
            | BulkheadEvent::CallFinished { timestamp, .. }
            | BulkheadEvent::CallFailed { timestamp, .. } => *timestamp,
        }
    }

    /// The name of the guarded handler.
    fn pattern_name(&self) -> &str {
        match self {
            BulkheadEvent::CallPermitted { handler, .. }
            | BulkheadEvent::CallQueued { handler, .. }
            | BulkheadEvent::CallRejected { handler, .. }
            | BulkheadEvent::CallFinished { handler, .. }
            | BulkheadEvent::CallFailed { handler, .. } => handler,
        }
    }
}
