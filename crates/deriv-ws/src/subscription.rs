//! Subscription dispatch table.
//!
//! Stream messages are routed by `(channel, instrument)` to a single
//! registered [`Subscriber`]. Entries keep their original request so the
//! connection manager can re-issue them after a reconnect.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{WsError, WsResult};
use crate::message::{StreamPayload, WsRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ticks,
    Candles,
    Contract,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticks => "ticks",
            Self::Candles => "candles",
            Self::Contract => "contract",
        }
    }
}

/// Dispatch key. The instrument is a symbol, or a contract id for `Contract`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub instrument: String,
}

impl SubscriptionKey {
    pub fn new(channel: Channel, instrument: impl Into<String>) -> Self {
        Self {
            channel,
            instrument: instrument.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel.as_str(), self.instrument)
    }
}

/// Event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub key: SubscriptionKey,
    /// Per-subscription sequence number, starting at 1.
    pub seq: u64,
    pub payload: StreamPayload,
}

/// Receives stream events. Called from the transport read loop, so
/// implementations must hand off without blocking.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, event: StreamEvent);
}

impl Subscriber for mpsc::UnboundedSender<StreamEvent> {
    fn deliver(&self, event: StreamEvent) {
        if self.send(event).is_err() {
            debug!("Subscriber channel closed, event dropped");
        }
    }
}

struct Entry {
    subscriber: Arc<dyn Subscriber>,
    request: WsRequest,
    server_id: Option<String>,
    last_seq: AtomicU64,
}

/// Snapshot of an entry, used for re-issuing after reconnect.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub key: SubscriptionKey,
    pub request: WsRequest,
    pub server_id: Option<String>,
    pub last_seq: u64,
}

/// At most one entry per key.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<SubscriptionKey, Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Fails if the key is already taken.
    pub fn insert(
        &self,
        key: SubscriptionKey,
        request: WsRequest,
        subscriber: Arc<dyn Subscriber>,
    ) -> WsResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(WsError::DuplicateSubscription(key.to_string()));
        }
        entries.insert(
            key,
            Entry {
                subscriber,
                request,
                server_id: None,
                last_seq: AtomicU64::new(0),
            },
        );
        Ok(())
    }

    /// Remove an entry, returning its server subscription id if known.
    pub fn remove(&self, key: &SubscriptionKey) -> Option<Option<String>> {
        self.entries.write().remove(key).map(|e| e.server_id)
    }

    pub fn set_server_id(&self, key: &SubscriptionKey, server_id: Option<String>) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.server_id = server_id;
        }
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Deliver a payload to the subscriber for `key`. Returns false when
    /// nothing is registered.
    pub fn dispatch(&self, key: &SubscriptionKey, payload: StreamPayload) -> bool {
        let entries = self.entries.read();
        let Some(entry) = entries.get(key) else {
            trace!(%key, "No subscriber for stream message");
            return false;
        };
        let seq = entry.last_seq.fetch_add(1, Ordering::SeqCst) + 1;
        entry.subscriber.deliver(StreamEvent {
            key: key.clone(),
            seq,
            payload,
        });
        true
    }

    pub fn records(&self) -> Vec<SubscriptionRecord> {
        self.entries
            .read()
            .iter()
            .map(|(key, e)| SubscriptionRecord {
                key: key.clone(),
                request: e.request.clone(),
                server_id: e.server_id.clone(),
                last_seq: e.last_seq.load(Ordering::SeqCst),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
