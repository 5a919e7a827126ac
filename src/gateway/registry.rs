//! Request registry
//!
//! Correlates requests with responses. Every request gets exactly one
//! terminal outcome: its response, its deadline, or rejection when the
//! connection goes away. Whichever comes first removes the entry, so the
//! other two find nothing to resolve.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::{encode, GatewayFrame, RequestFrame, ResponseFrame};
use super::transport::Outbound;
use crate::error::{Error, Result};

/// An in-flight request
struct PendingRequest {
    /// Originating method, for diagnostics
    method: String,
    deadline: Instant,
    reply: oneshot::Sender<Result<Value>>,
    /// Deadline task; aborted when the request resolves another way
    timer: AbortHandle,
}

#[derive(Default)]
struct RegistryState {
    pending: HashMap<String, PendingRequest>,
    /// Writer of the current connection; `None` while detached
    outbound: Option<mpsc::Sender<Outbound>>,
}

/// Tracks in-flight requests of the current connection
#[derive(Clone)]
pub struct RequestRegistry {
    state: Arc<Mutex<RegistryState>>,
    timeout: Duration,
}

/// Completion handle of one request
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    method: String,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResponse {
    /// Correlation ID of the request
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Method of the request
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Future for PendingResponse {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without an outcome: the registry itself is gone
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl RequestRegistry {
    /// Create a detached registry with the given per-request deadline
    pub fn new(timeout: Duration) -> Self {
        RequestRegistry {
            state: Arc::new(Mutex::new(RegistryState::default())),
            timeout,
        }
    }

    /// Per-request deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        lock_state(&self.state)
    }

    /// Route new requests to a freshly opened connection
    pub fn attach(&self, outbound: mpsc::Sender<Outbound>) {
        self.lock().outbound = Some(outbound);
    }

    /// Whether a connection is attached
    pub fn is_attached(&self) -> bool {
        self.lock().outbound.is_some()
    }

    /// Number of requests awaiting an outcome
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Send a request and return its completion handle
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<PendingResponse> {
        self.send_with_timeout(method, params, self.timeout).await
    }

    /// Send a request with an explicit deadline
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<PendingResponse> {
        let id = Uuid::new_v4().to_string();
        let text = encode(&GatewayFrame::Request(RequestFrame::new(&id, method, params)))?;
        let (reply, rx) = oneshot::channel();

        let outbound = {
            let mut state = self.lock();
            let outbound = state.outbound.clone().ok_or(Error::NotConnected)?;
            let timer = self.spawn_deadline(id.clone(), timeout);
            state.pending.insert(
                id.clone(),
                PendingRequest {
                    method: method.to_string(),
                    deadline: Instant::now() + timeout,
                    reply,
                    timer,
                },
            );
            outbound
        };

        debug!("Gateway request -> {} ({})", method, id);
        if outbound.send(Outbound::Text(text)).await.is_err() {
            // Writer already gone; resolve through the normal path
            self.finish(&id, Err(Error::ConnectionClosed));
        }

        Ok(PendingResponse {
            id,
            method: method.to_string(),
            rx,
        })
    }

    fn spawn_deadline(&self, id: String, timeout: Duration) -> AbortHandle {
        let state: Weak<Mutex<RegistryState>> = Arc::downgrade(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(state) = state.upgrade() else {
                return;
            };
            let entry = lock_state(&state).pending.remove(&id);
            if let Some(entry) = entry {
                warn!("Gateway request {} ({}) timed out after {:?}", entry.method, id, timeout);
                let _ = entry.reply.send(Err(Error::RequestTimeout {
                    method: entry.method,
                    timeout,
                }));
            }
        })
        .abort_handle()
    }

    /// Resolve the request a response belongs to
    ///
    /// Returns `false` if no request with that ID is pending (late, duplicate
    /// or stale responses).
    pub fn resolve(&self, response: ResponseFrame) -> bool {
        let result = if response.ok {
            Ok(response.payload.unwrap_or(Value::Null))
        } else {
            let error = response.error.unwrap_or_default();
            Err(Error::RequestFailed {
                code: error.code_or_default().to_string(),
                message: error.message_or_default().to_string(),
            })
        };

        if self.finish(&response.id, result) {
            true
        } else {
            debug!("Ignoring response for unknown request {}", response.id);
            false
        }
    }

    fn finish(&self, id: &str, result: Result<Value>) -> bool {
        let entry = self.lock().pending.remove(id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                debug!(
                    "Gateway response <- {} ({}) with {:?} to spare",
                    entry.method,
                    id,
                    entry.deadline.saturating_duration_since(Instant::now())
                );
                let _ = entry.reply.send(result);
                true
            }
            None => false,
        }
    }

    /// Detach from the connection and fail every pending request
    ///
    /// All entries are drained under one lock, so no response processed
    /// afterwards can resolve any of them.
    pub fn reject_all(&self) -> usize {
        let drained: Vec<(String, PendingRequest)> = {
            let mut state = self.lock();
            state.outbound = None;
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (id, entry) in drained {
            entry.timer.abort();
            debug!("Rejecting {} ({}): connection closed", entry.method, id);
            let _ = entry.reply.send(Err(Error::ConnectionClosed));
        }
        if count > 0 {
            warn!("Connection closed with {} request(s) outstanding", count);
        }
        count
    }
}

fn lock_state(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
