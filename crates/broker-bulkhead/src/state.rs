//! Admission state shared by every clone of one guarded handler.
//!
//! The counter and the wait queue live behind a single mutex. Admission,
//! release and drain are each one critical section; the lock is never held
//! across an await point or a handler call.
//!
//! A slot is a [`Permit`]. Dropping it releases the slot and hands the freed
//! capacity to the oldest waiter, so the release happens on every completion
//! path, including a caller dropping its future mid-call.

use crate::config::BulkheadConfig;
use crate::error::BulkheadError;
use crate::kind::HandlerKind;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// Point-in-time view of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BulkheadSnapshot {
    /// Calls currently holding a slot.
    pub in_flight: usize,
    /// Configured concurrency.
    pub concurrency: usize,
    /// Calls waiting for a slot.
    pub queue_len: usize,
    /// Configured queue limit, `None` when unbounded.
    pub max_queue_size: Option<usize>,
}

struct Slots<K: HandlerKind> {
    in_flight: usize,
    queue: VecDeque<oneshot::Sender<Permit<K>>>,
    /// Queue length at which abandoned waiters are next purged on enqueue.
    purge_at: usize,
}

impl<K: HandlerKind> Slots<K> {
    /// Drops waiters whose caller went away. Returns how many were dropped.
    fn purge_closed(&mut self) -> usize {
        let before = self.queue.len();
        self.queue.retain(|waiter| !waiter.is_closed());
        self.purge_at = (self.queue.len() * 2).max(1);
        before - self.queue.len()
    }
}

/// Outcome of an admission attempt.
pub(crate) enum Admission<K: HandlerKind> {
    /// A slot was free.
    Permitted(Permit<K>),
    /// The call waits for a slot; `queue_len` includes it.
    Queued {
        waiter: oneshot::Receiver<Permit<K>>,
        queue_len: usize,
    },
    /// The queue is at its limit.
    Rejected(BulkheadError),
}

pub(crate) struct GuardState<K: HandlerKind> {
    config: Arc<BulkheadConfig<K>>,
    slots: Mutex<Slots<K>>,
}

impl<K: HandlerKind> GuardState<K> {
    pub(crate) fn new(config: Arc<BulkheadConfig<K>>) -> Arc<Self> {
        let state = Arc::new(Self {
            config,
            slots: Mutex::new(Slots {
                in_flight: 0,
                queue: VecDeque::new(),
                purge_at: 1,
            }),
        });
        crate::metrics::record(&state.config, 0, 0);
        state
    }

    pub(crate) fn config(&self) -> &BulkheadConfig<K> {
        &self.config
    }

    /// Decides synchronously whether a new call runs now, waits, or is
    /// rejected.
    pub(crate) fn admit(self: &Arc<Self>) -> Admission<K> {
        let mut slots = self.slots.lock();

        if slots.in_flight < self.config.concurrency.get() {
            slots.in_flight += 1;
            let in_flight = slots.in_flight;
            self.record(&slots);
            return Admission::Permitted(Permit::new(Arc::clone(self), in_flight));
        }

        // callers that gave up while queued still occupy a place; the purge
        // runs each time the queue doubles, and always before a rejection
        if slots.queue.len() >= slots.purge_at {
            slots.purge_closed();
        }
        if let Some(limit) = self.config.max_queue_size {
            if slots.queue.len() >= limit.get() {
                slots.purge_closed();
            }
            if slots.queue.len() >= limit.get() {
                self.record(&slots);
                return Admission::Rejected(self.queue_full());
            }
        }

        let (tx, rx) = oneshot::channel();
        slots.queue.push_back(tx);
        let queue_len = slots.queue.len();
        self.record(&slots);

        #[cfg(feature = "tracing")]
        debug!(
            kind = %K::KIND,
            handler = %self.config.handler.name,
            queue_len,
            "bulkhead full, call queued"
        );

        Admission::Queued {
            waiter: rx,
            queue_len,
        }
    }

    /// Current counts. Abandoned waiters are purged first so they are not
    /// reported as queued.
    pub(crate) fn snapshot(&self) -> BulkheadSnapshot {
        let mut slots = self.slots.lock();
        if slots.purge_closed() > 0 {
            self.record(&slots);
        }
        BulkheadSnapshot {
            in_flight: slots.in_flight,
            concurrency: self.config.concurrency.get(),
            queue_len: slots.queue.len(),
            max_queue_size: self.config.max_queue_size(),
        }
    }

    fn queue_full(&self) -> BulkheadError {
        BulkheadError::QueueFull {
            kind: K::KIND,
            name: self.config.handler.name.clone(),
            service: self.config.handler.service.clone(),
            node: self.config.node_id.clone(),
            concurrency: self.config.concurrency.get(),
        }
    }

    fn release(self: &Arc<Self>) {
        let mut slots = self.slots.lock();
        debug_assert!(slots.in_flight > 0, "released more slots than admitted");
        slots.in_flight = slots.in_flight.saturating_sub(1);
        self.drain(&mut slots);
        self.record(&slots);
    }

    /// Hands free slots to the oldest waiters until either runs out. The
    /// caller records the resulting counts.
    fn drain(self: &Arc<Self>, slots: &mut Slots<K>) {
        while slots.in_flight < self.config.concurrency.get() {
            let Some(waiter) = slots.queue.pop_front() else {
                break;
            };

            slots.in_flight += 1;
            let permit = Permit::new(Arc::clone(self), slots.in_flight);
            match waiter.send(permit) {
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    trace!(
                        kind = %K::KIND,
                        handler = %self.config.handler.name,
                        in_flight = slots.in_flight,
                        "queued call admitted"
                    );
                }
                Err(permit) => {
                    // the caller went away while queued; take the slot back
                    permit.disarm();
                    slots.in_flight -= 1;
                }
            }
        }
    }

    fn record(&self, slots: &Slots<K>) {
        crate::metrics::record(&self.config, slots.in_flight, slots.queue.len());
    }
}

/// A held slot. Dropping it frees the slot and drains the queue.
pub(crate) struct Permit<K: HandlerKind> {
    state: Option<Arc<GuardState<K>>>,
    in_flight: usize,
}

impl<K: HandlerKind> Permit<K> {
    fn new(state: Arc<GuardState<K>>, in_flight: usize) -> Self {
        Self {
            state: Some(state),
            in_flight,
        }
    }

    /// In-flight calls right after this permit was granted.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Drops the permit without releasing, for slots that were never used.
    fn disarm(mut self) {
        self.state = None;
    }
}

impl<K: HandlerKind> Drop for Permit<K> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.release();
        }
    }
}

impl<K: HandlerKind> fmt::Debug for Permit<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("in_flight", &self.in_flight)
            .field("armed", &self.state.is_some())
            .finish()
    }
}
