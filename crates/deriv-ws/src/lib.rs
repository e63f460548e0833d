//! Session transport for the Deriv WebSocket API.
//!
//! Provides a resilient, authenticated session with:
//! - Token shape checks and masked diagnostics before any network traffic
//! - Request/response correlation by `req_id` with per-request timeouts
//! - Stream subscriptions restored across reconnects
//! - Heartbeat pings with missed-ack detection
//! - Exponential backoff with jitter and primary/backup endpoint rotation
//! - A simulated venue behind the same `Connector` seam as the live socket

pub mod backoff;
pub mod connection;
pub mod connector;
pub mod correlator;
pub mod credentials;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod session;
pub mod sim;
pub mod subscription;

pub use backoff::BackoffPolicy;
pub use connection::{
    ConnectionConfig, ConnectionManager, TransportStats, DEFAULT_APP_ID, DEFAULT_BACKUP_ENDPOINT,
    DEFAULT_PRIMARY_ENDPOINT,
};
pub use connector::{BoxFuture, Connector, Frame, Link, LiveConnector};
pub use correlator::{Correlator, PendingResponse};
pub use credentials::{mask_token, validate_token, Credentials, TokenDiagnostic};
pub use error::{FatalReport, WsError, WsResult};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use message::{
    api_error_hint, ApiError, BuyReceipt, CandleData, ContractUpdate, InboundMessage,
    ProposalParams, ProposalQuote, StreamPayload, TickData, WsRequest,
};
pub use session::{AccountInfo, SessionInfo, SessionState, SessionView};
pub use sim::{SimConfig, SimHandle, SimulatedConnector};
pub use subscription::{Channel, StreamEvent, Subscriber, SubscriptionKey, SubscriptionRecord};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the TLS crypto provider.
/// Must be called before any live connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
