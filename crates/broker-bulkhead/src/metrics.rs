//! Gauges recorded by the guard.
//!
//! Four gauges per handler kind, labelled with the handler name (under the
//! kind's label key) and the owning service:
//!
//! | action                              | event                             |
//! |-------------------------------------|-----------------------------------|
//! | `request.bulkhead.inflight`         | `event.bulkhead.inflight`         |
//! | `request.bulkhead.inflight.limit`   | `event.bulkhead.inflight.limit`   |
//! | `request.bulkhead.queue.size`       | `event.bulkhead.queue.size`       |
//! | `request.bulkhead.queue.size.limit` | `event.bulkhead.queue.size.limit` |
//!
//! Without the `metrics` feature, recording compiles to nothing.

use crate::config::BulkheadConfig;
use crate::kind::HandlerKind;

#[cfg(feature = "metrics")]
use crate::kind::{Action, Event};
#[cfg(feature = "metrics")]
use metrics::{describe_gauge, gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Registers descriptions for the gauges of both handler kinds.
///
/// Safe to call any number of times; only the first call has an effect.
pub fn describe_metrics() {
    #[cfg(feature = "metrics")]
    METRICS_INIT.call_once(|| {
        describe_gauge!(Action::INFLIGHT, "Number of in-flight calls per action");
        describe_gauge!(Action::INFLIGHT_LIMIT, "Concurrency limit per action");
        describe_gauge!(Action::QUEUE_SIZE, "Number of queued calls per action");
        describe_gauge!(Action::QUEUE_SIZE_LIMIT, "Queue size limit per action");
        describe_gauge!(Event::INFLIGHT, "Number of in-flight calls per event handler");
        describe_gauge!(Event::INFLIGHT_LIMIT, "Concurrency limit per event handler");
        describe_gauge!(Event::QUEUE_SIZE, "Number of queued calls per event handler");
        describe_gauge!(Event::QUEUE_SIZE_LIMIT, "Queue size limit per event handler");
    });
}

/// Sets the gauges of one guard. Limit gauges are skipped when unset.
#[cfg(feature = "metrics")]
pub(crate) fn record<K: HandlerKind>(
    config: &BulkheadConfig<K>,
    in_flight: usize,
    queue_len: usize,
) {
    let label = K::KIND.as_str();
    let name = &config.handler.name;
    let service = &config.handler.service;

    gauge!(K::INFLIGHT, label => name.clone(), "service" => service.clone())
        .set(in_flight as f64);
    gauge!(K::INFLIGHT_LIMIT, label => name.clone(), "service" => service.clone())
        .set(config.concurrency.get() as f64);
    gauge!(K::QUEUE_SIZE, label => name.clone(), "service" => service.clone())
        .set(queue_len as f64);
    if let Some(limit) = config.max_queue_size {
        gauge!(K::QUEUE_SIZE_LIMIT, label => name.clone(), "service" => service.clone())
            .set(limit.get() as f64);
    }
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record<K: HandlerKind>(
    _config: &BulkheadConfig<K>,
    _in_flight: usize,
    _queue_len: usize,
) {
}
