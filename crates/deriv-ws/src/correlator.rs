//! Request/response correlation.
//!
//! Every outbound request gets a unique `req_id` and a one-shot completion
//! slot. The slot is consumed exactly once: by the response, by a timeout,
//! or by a session-wide failure.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{WsError, WsResult};

type Completion = oneshot::Sender<WsResult<Value>>;

// ============================================================================
// PendingRequest
// ============================================================================

/// A request awaiting its response.
pub struct PendingRequest {
    pub req_id: u64,
    /// Request name, for logging.
    pub method: String,
    pub created_at: Instant,
    tx: Option<Completion>,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("req_id", &self.req_id)
            .field("method", &self.method)
            .field("created_at", &self.created_at)
            .field("has_tx", &self.tx.is_some())
            .finish()
    }
}

// ============================================================================
// Correlator
// ============================================================================

#[derive(Debug)]
pub struct Correlator {
    pending: DashMap<u64, PendingRequest>,
    next_req_id: AtomicU64,
    timeouts_total: AtomicU64,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_req_id: AtomicU64::new(1),
            timeouts_total: AtomicU64::new(0),
        }
    }

    /// Allocate a correlation id without registering a completion slot.
    pub fn next_id(&self) -> u64 {
        self.next_req_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a new pending request.
    pub fn register(&self, method: &str) -> (u64, oneshot::Receiver<WsResult<Value>>) {
        let req_id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            req_id,
            PendingRequest {
                req_id,
                method: method.to_string(),
                created_at: Instant::now(),
                tx: Some(tx),
            },
        );
        (req_id, rx)
    }

    pub fn is_pending(&self, req_id: u64) -> bool {
        self.pending.contains_key(&req_id)
    }

    /// Fulfil a request. Returns false if it was already completed.
    pub fn complete(&self, req_id: u64, result: WsResult<Value>) -> bool {
        match self.pending.remove(&req_id) {
            Some((_, mut request)) => {
                if let Some(tx) = request.tx.take() {
                    if tx.send(result).is_err() {
                        debug!(req_id, method = %request.method, "Requester went away before completion");
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Drop a request whose waiter timed out.
    pub fn expire(&self, req_id: u64) -> bool {
        if let Some((_, request)) = self.pending.remove(&req_id) {
            self.timeouts_total.fetch_add(1, Ordering::Relaxed);
            warn!(
                req_id,
                method = %request.method,
                elapsed_ms = request.created_at.elapsed().as_millis() as u64,
                "Request timed out"
            );
            true
        } else {
            false
        }
    }

    /// Fail every pending request. Returns how many were failed.
    pub fn fail_all(&self, error: WsError) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        let mut failed = 0;
        for req_id in ids {
            if self.complete(req_id, Err(error.clone())) {
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(failed, %error, "Failed pending requests");
        }
        failed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn timeouts_total(&self) -> u64 {
        self.timeouts_total.load(Ordering::Relaxed)
    }
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Caller's handle to an in-flight request.
#[derive(Debug)]
pub struct PendingResponse {
    req_id: u64,
    rx: oneshot::Receiver<WsResult<Value>>,
    timeout: Duration,
    correlator: Arc<Correlator>,
}

impl PendingResponse {
    pub(crate) fn new(
        req_id: u64,
        rx: oneshot::Receiver<WsResult<Value>>,
        timeout: Duration,
        correlator: Arc<Correlator>,
    ) -> Self {
        Self {
            req_id,
            rx,
            timeout,
            correlator,
        }
    }

    pub fn req_id(&self) -> u64 {
        self.req_id
    }

    /// Wait for the response, failing with `RequestTimeout` after the
    /// configured request timeout.
    pub async fn wait(mut self) -> WsResult<Value> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WsError::Cancelled),
            Err(_) => {
                // Completed between the deadline and now.
                if let Ok(result) = self.rx.try_recv() {
                    return result;
                }
                self.correlator.expire(self.req_id);
                Err(WsError::RequestTimeout {
                    req_id: self.req_id,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_exactly_once() {
        let correlator = Arc::new(Correlator::new());
        let (req_id, rx) = correlator.register("ping");
        assert!(correlator.is_pending(req_id));

        assert!(correlator.complete(req_id, Ok(json!({"ping": "pong"}))));
        assert!(!correlator.complete(req_id, Ok(json!({"ping": "again"}))));

        let response = PendingResponse::new(req_id, rx, Duration::from_secs(1), correlator.clone());
        assert_eq!(response.wait().await.unwrap()["ping"], "pong");
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unique_ids() {
        let correlator = Correlator::new();
        let (a, _ra) = correlator.register("ticks");
        let (b, _rb) = correlator.register("ticks");
        let c = correlator.next_id();
        assert!(a < b && b < c);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_pending() {
        let correlator = Arc::new(Correlator::new());
        let (req_id, rx) = correlator.register("proposal");
        let response =
            PendingResponse::new(req_id, rx, Duration::from_millis(50), correlator.clone());

        let err = response.wait().await.unwrap_err();
        assert!(matches!(err, WsError::RequestTimeout { req_id: id } if id == req_id));
        assert!(!correlator.is_pending(req_id));
        assert_eq!(correlator.timeouts_total(), 1);
        // A late response is ignored.
        assert!(!correlator.complete(req_id, Ok(json!({}))));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let correlator = Arc::new(Correlator::new());
        let (id1, rx1) = correlator.register("buy");
        let (id2, rx2) = correlator.register("proposal");

        assert_eq!(correlator.fail_all(WsError::Cancelled), 2);

        for (id, rx) in [(id1, rx1), (id2, rx2)] {
            let response = PendingResponse::new(id, rx, Duration::from_secs(1), correlator.clone());
            assert!(matches!(response.wait().await, Err(WsError::Cancelled)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let correlator = Arc::new(Correlator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = correlator.clone();
            handles.push(tokio::spawn(async move {
                (0..50).map(|_| c.register("ping").0).collect::<Vec<_>>()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.extend(h.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 400);
        assert_eq!(correlator.pending_count(), 400);
    }
}
