//! Tests for the broker bulkhead.
//!
//! Test organization:
//! - integration.rs: Layer and registry wiring through tower
//! - scenarios.rs: Queueing, rejection and failure scenarios with 10 calls
//! - concurrency.rs: FIFO order, slot release and limits under load
//! - config.rs: Option merging and validation
//! - registry.rs: Guard lifecycle in the registry

mod registry;
mod scenarios;

use broker_bulkhead::GuardError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

/// Error returned by a crashing test handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crashed(pub u64);

impl std::fmt::Display for Crashed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler {} crashed", self.0)
    }
}

impl std::error::Error for Crashed {}

pub type TestError = GuardError<Crashed>;

/// Invocation context passed to the test handler.
#[derive(Debug, Clone)]
pub struct Call {
    pub id: u64,
    pub delay: Duration,
    pub crash: bool,
}

impl Call {
    /// A call that sleeps `10ms * id` before settling.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            delay: Duration::from_millis(10 * id),
            crash: false,
        }
    }

    pub fn crashing(mut self) -> Self {
        self.crash = true;
        self
    }
}

/// Records what the guarded handler saw.
#[derive(Clone, Default)]
pub struct Flow {
    pub started: Arc<Mutex<Vec<u64>>>,
    pub invoked: Arc<AtomicUsize>,
    pub settled: Arc<AtomicUsize>,
    pub current: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl Flow {
    pub fn invoked(&self) -> usize {
        self.invoked.load(Ordering::SeqCst)
    }

    pub fn settled(&self) -> usize {
        self.settled.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<u64> {
        self.started.lock().unwrap().clone()
    }

    /// Yields until the handler has been invoked `n` times.
    pub async fn wait_for_invocations(&self, n: usize) {
        while self.invoked() < n {
            tokio::task::yield_now().await;
        }
    }
}

/// A handler that sleeps for the call's delay and crashes when asked to.
#[derive(Clone)]
pub struct TestHandler {
    flow: Flow,
}

pub fn handler(flow: &Flow) -> TestHandler {
    TestHandler { flow: flow.clone() }
}

impl tower::Service<Call> for TestHandler {
    type Response = u64;
    type Error = TestError;
    type Future = Pin<Box<dyn Future<Output = Result<u64, TestError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let flow = self.flow.clone();
        Box::pin(async move {
            flow.started.lock().unwrap().push(call.id);
            flow.invoked.fetch_add(1, Ordering::SeqCst);
            let now = flow.current.fetch_add(1, Ordering::SeqCst) + 1;
            flow.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(call.delay).await;

            flow.current.fetch_sub(1, Ordering::SeqCst);
            flow.settled.fetch_add(1, Ordering::SeqCst);
            if call.crash {
                Err(GuardError::Handler(Crashed(call.id)))
            } else {
                Ok(call.id)
            }
        })
    }
}
