//! In-memory transport for tests/dev.
//!
//! - No IO: every call is answered by a handler closure
//! - Counts dials and network attempts
//! - Fault injection: failing dials, dropped connections, per-call latency

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::time::Instant;

use super::{Channel, Dialer};
use crate::error::{ConnectivityError, RpcError, RpcResult};

/// Answers one call: `(method, params) -> response`.
pub type Handler = Arc<dyn Fn(&str, JsonValue) -> RpcResult<JsonValue> + Send + Sync>;

/// One network attempt observed by the in-memory transport.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// 1-based number of the dial that produced the channel.
    pub channel: usize,
    pub method: String,
    pub params: JsonValue,
}

#[derive(Default)]
struct Faults {
    failing_dials: u32,
    dropped_calls: u32,
    latency: Option<Duration>,
}

struct Shared {
    handler: Handler,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<CallRecord>>,
    dial_times: Mutex<Vec<Instant>>,
    dials: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dialer producing in-memory channels that share one handler.
#[derive(Clone)]
pub struct InMemoryDialer {
    shared: Arc<Shared>,
}

impl InMemoryDialer {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, JsonValue) -> RpcResult<JsonValue> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                handler: Arc::new(handler),
                faults: Mutex::new(Faults::default()),
                calls: Mutex::new(Vec::new()),
                dial_times: Mutex::new(Vec::new()),
                dials: AtomicUsize::new(0),
            }),
        }
    }

    /// A server that answers every call with `null`.
    pub fn accepting() -> Self {
        Self::new(|_, _| Ok(JsonValue::Null))
    }

    /// Make the next `n` dials fail with a dial error.
    pub fn fail_next_dials(&self, n: u32) {
        lock(&self.shared.faults).failing_dials = n;
    }

    /// Make the next `n` calls kill their channel and fail with `UnexpectedEof`.
    pub fn drop_next_calls(&self, n: u32) {
        lock(&self.shared.faults).dropped_calls = n;
    }

    /// Delay every call by `latency` before it is answered.
    pub fn with_latency(self, latency: Duration) -> Self {
        lock(&self.shared.faults).latency = Some(latency);
        self
    }

    /// Number of dial attempts, successful or not.
    pub fn dial_count(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }

    /// Start time of every dial attempt, in order.
    pub fn dial_times(&self) -> Vec<Instant> {
        lock(&self.shared.dial_times).clone()
    }

    /// Every network attempt, in order, including the ones that failed.
    pub fn calls(&self) -> Vec<CallRecord> {
        lock(&self.shared.calls).clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }
}

impl core::fmt::Debug for InMemoryDialer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryDialer")
            .field("dials", &self.dial_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Dialer for InMemoryDialer {
    async fn dial(&self, endpoint: &str) -> RpcResult<Arc<dyn Channel>> {
        lock(&self.shared.dial_times).push(Instant::now());
        let number = self.shared.dials.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut faults = lock(&self.shared.faults);
            if faults.failing_dials > 0 {
                faults.failing_dials -= 1;
                return Err(RpcError::dial(endpoint, "connection refused"));
            }
        }

        Ok(Arc::new(InMemoryChannel {
            number,
            dead: AtomicBool::new(false),
            shared: self.shared.clone(),
        }))
    }
}

struct InMemoryChannel {
    number: usize,
    dead: AtomicBool,
    shared: Arc<Shared>,
}

#[async_trait]
impl Channel for InMemoryChannel {
    async fn call(&self, method: &str, params: JsonValue) -> RpcResult<JsonValue> {
        lock(&self.shared.calls).push(CallRecord {
            channel: self.number,
            method: method.to_string(),
            params: params.clone(),
        });

        if self.dead.load(Ordering::SeqCst) {
            return Err(ConnectivityError::ChannelClosed.into());
        }

        let latency = lock(&self.shared.faults).latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        // Drops strike after the latency, i.e. while the call is in flight.
        {
            let mut faults = lock(&self.shared.faults);
            if faults.dropped_calls > 0 {
                faults.dropped_calls -= 1;
                self.dead.store(true, Ordering::SeqCst);
                return Err(ConnectivityError::UnexpectedEof.into());
            }
        }

        (self.shared.handler)(method, params)
    }

    async fn close(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }
}
