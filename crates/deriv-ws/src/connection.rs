//! Session connection manager.
//!
//! Owns the session state machine:
//! `Disconnected -> Connecting -> Authenticating -> Ready`, with
//! `Ready -> Reconnecting -> Ready` on link failure and `Closed` once
//! reconnect attempts are exhausted or credentials are rejected.
//!
//! The first connect and authorization happen on the caller's task. After
//! that a supervisor task runs the link loop, which only classifies and
//! dispatches inbound frames; it never waits on subscribers.

use chrono::Utc;
use deriv_core::AccountType;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::BackoffPolicy;
use crate::connector::{Connector, Frame, Link};
use crate::correlator::{Correlator, PendingResponse};
use crate::credentials::{validate_token, Credentials, TokenDiagnostic};
use crate::error::{FatalReport, WsError, WsResult};
use crate::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
use crate::message::{api_error_hint, is_auth_error_code, InboundMessage, WsRequest};
use crate::session::{AccountInfo, SessionCell, SessionInfo, SessionState, SessionView};
use crate::subscription::{Subscriber, SubscriptionKey, SubscriptionRegistry};

pub const DEFAULT_PRIMARY_ENDPOINT: &str = "wss://ws.derivapi.com/websockets/v3";
pub const DEFAULT_BACKUP_ENDPOINT: &str = "wss://ws.binaryws.com/websockets/v3";
pub const DEFAULT_APP_ID: u32 = 1089;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub primary_url: String,
    pub backup_url: Option<String>,
    pub app_id: u32,
    pub account_type: AccountType,
    pub credentials: Credentials,
    /// Per-request response deadline.
    pub request_timeout_ms: u64,
    /// Deadline for opening a link.
    pub connect_timeout_ms: u64,
    /// Deadline for the supervisor to stop on disconnect.
    pub disconnect_timeout_ms: u64,
    pub backoff: BackoffPolicy,
    pub heartbeat: HeartbeatConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            primary_url: DEFAULT_PRIMARY_ENDPOINT.to_string(),
            backup_url: Some(DEFAULT_BACKUP_ENDPOINT.to_string()),
            app_id: DEFAULT_APP_ID,
            account_type: AccountType::Demo,
            credentials: Credentials::default(),
            request_timeout_ms: 20_000,
            connect_timeout_ms: 20_000,
            disconnect_timeout_ms: 5_000,
            backoff: BackoffPolicy::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Attempt 1 uses the primary endpoint; later attempts alternate.
    pub fn endpoint_for_attempt(&self, attempt: u32) -> &str {
        match &self.backup_url {
            Some(backup) if attempt % 2 == 0 => backup,
            _ => &self.primary_url,
        }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{endpoint}?app_id={}", self.app_id)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Point-in-time transport counters.
#[derive(Debug, Clone)]
pub struct TransportStats {
    pub state: SessionState,
    pub pending_requests: usize,
    pub subscriptions: usize,
    pub request_timeouts_total: u64,
    pub reconnects_total: u64,
}

struct Outbound {
    req_id: u64,
    text: String,
}

enum LinkExit {
    Shutdown,
    Failed(WsError),
}

// ============================================================================
// Shared state
// ============================================================================

struct Shared {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    session: SessionCell,
    correlator: Arc<Correlator>,
    subscriptions: SubscriptionRegistry,
    heartbeat: HeartbeatMonitor,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: TokioMutex<mpsc::UnboundedReceiver<Outbound>>,
    shutdown_token: parking_lot::Mutex<CancellationToken>,
}

impl Shared {
    fn checked_token(&self, account: AccountType) -> WsResult<String> {
        let token = self.config.credentials.token(account).unwrap_or("");
        validate_token(token).map_err(|diagnostic| WsError::Auth {
            message: format!("malformed {account} token"),
            diagnostic: Some(diagnostic),
        })?;
        Ok(token.to_string())
    }

    /// Open a link, authorize and restore subscriptions.
    async fn establish(&self, endpoint: &str) -> WsResult<Link> {
        self.session.set_state(SessionState::Connecting);
        self.session
            .update(|info| info.endpoint = Some(endpoint.to_string()));

        let url = self.config.url(endpoint);
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut link = tokio::time::timeout(connect_timeout, self.connector.connect(&url))
            .await
            .map_err(|_| WsError::Network(format!("connect to {endpoint} timed out")))??;

        self.session.set_state(SessionState::Authenticating);
        let account = self.session.snapshot().account_type;
        let token = self.checked_token(account)?;

        let reply = match self.exchange(&mut link, &WsRequest::authorize(&token)).await {
            Ok(reply) => reply,
            Err(WsError::Api { code, message }) if is_auth_error_code(&code) => {
                return Err(WsError::Auth {
                    message: format!("{code}: {message} ({})", api_error_hint(&code)),
                    diagnostic: Some(TokenDiagnostic::inspect(&token)),
                });
            }
            Err(e) => return Err(e),
        };

        let account_info = AccountInfo::from_authorize(&reply.body)?;
        info!(
            login_id = %account_info.login_id,
            currency = %account_info.currency,
            balance = %account_info.balance,
            is_virtual = account_info.is_virtual,
            "Authorized"
        );
        let now = Utc::now();
        self.session.update(|info| {
            info.account = Some(account_info);
            info.last_heartbeat = Some(now);
        });
        self.heartbeat.reset();

        self.restore_subscriptions(&mut link).await?;
        Ok(link)
    }

    async fn restore_subscriptions(&self, link: &mut Link) -> WsResult<()> {
        let records = self.subscriptions.records();
        if records.is_empty() {
            return Ok(());
        }
        info!(count = records.len(), "Restoring subscriptions");

        for record in records {
            match self.exchange(link, &record.request).await {
                Ok(_) => debug!(key = %record.key, last_seq = record.last_seq, "Subscription restored"),
                Err(WsError::Api { code, message }) => {
                    warn!(key = %record.key, %code, %message, "Subscription restore rejected");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Send one request directly on a link and read until its response.
    /// Used before the link loop owns the link.
    async fn exchange(&self, link: &mut Link, request: &WsRequest) -> WsResult<InboundMessage> {
        let req_id = self.correlator.next_id();
        link.sink.send(Frame::Text(request.encode(req_id)?)).await?;
        let deadline = Instant::now() + self.config.request_timeout();

        loop {
            let frame = tokio::time::timeout_at(deadline, link.stream.next())
                .await
                .map_err(|_| WsError::RequestTimeout { req_id })?;
            match frame {
                Some(Ok(Frame::Text(text))) => {
                    self.heartbeat.record_activity();
                    let msg = match InboundMessage::parse(&text) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(error = %e, "Dropping malformed message");
                            continue;
                        }
                    };
                    if msg.req_id == Some(req_id) {
                        if let Some(err) = msg.error {
                            return Err(WsError::Api {
                                code: err.code,
                                message: err.message,
                            });
                        }
                        self.absorb_subscription_ack(&msg);
                        return Ok(msg);
                    }
                    self.route(msg);
                }
                Some(Ok(Frame::Ping(data))) => link.sink.send(Frame::Pong(data)).await?,
                Some(Ok(Frame::Pong(_))) => {}
                Some(Ok(Frame::Close)) | None => {
                    return Err(WsError::Network(format!(
                        "link closed while waiting for {}",
                        request.name()
                    )));
                }
                Some(Err(e)) => return Err(e),
            }
        }
    }

    /// Record the server id of a subscribe ack and forward any stream data
    /// it carries, so the subscriber sees it before later stream messages.
    fn absorb_subscription_ack(&self, msg: &InboundMessage) {
        if msg.error.is_some() || msg.subscription_id.is_none() {
            return;
        }
        let Some(key) = msg.stream_key() else {
            return;
        };
        if !self.subscriptions.contains(&key) {
            return;
        }
        self.subscriptions
            .set_server_id(&key, msg.subscription_id.clone());
        for payload in msg.stream_payloads() {
            self.subscriptions.dispatch(&key, payload);
        }
    }

    fn handle_text(&self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(msg) => self.route(msg),
            Err(e) => warn!(error = %e, "Dropping malformed message"),
        }
    }

    /// Classify an inbound message: pending response, heartbeat ack, or
    /// stream event.
    fn route(&self, msg: InboundMessage) {
        if let Some(req_id) = msg.req_id {
            if self.correlator.is_pending(req_id) {
                self.absorb_subscription_ack(&msg);
                self.correlator.complete(req_id, msg.into_result());
                return;
            }
        }

        if msg.msg_type == "ping" {
            let at = self.heartbeat.record_ack();
            self.session.update(|info| info.last_heartbeat = Some(at));
            return;
        }

        if let Some(err) = &msg.error {
            warn!(
                req_id = ?msg.req_id,
                msg_type = %msg.msg_type,
                code = %err.code,
                message = %err.message,
                hint = api_error_hint(&err.code),
                "Unsolicited API error"
            );
            return;
        }

        let Some(key) = msg.stream_key() else {
            debug!(msg_type = %msg.msg_type, "Unroutable message dropped");
            return;
        };
        for payload in msg.stream_payloads() {
            if !self.subscriptions.dispatch(&key, payload) {
                debug!(%key, "No subscriber, stream message dropped");
                break;
            }
        }
    }

    async fn run_link(&self, link: Link, token: &CancellationToken) -> LinkExit {
        let Link {
            mut sink,
            mut stream,
        } = link;
        let mut outbound = self.outbound_rx.lock().await;

        let mut ticker = tokio::time::interval(self.heartbeat.check_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    info!("Shutdown signal received in link loop");
                    if let Err(e) = sink.send(Frame::Close).await {
                        debug!(error = %e, "Failed to send close frame during shutdown");
                    }
                    return LinkExit::Shutdown;
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Frame::Text(text))) => {
                            self.heartbeat.record_activity();
                            self.handle_text(&text);
                        }
                        Some(Ok(Frame::Ping(data))) => {
                            self.heartbeat.record_activity();
                            if let Err(e) = sink.send(Frame::Pong(data)).await {
                                return LinkExit::Failed(e);
                            }
                        }
                        Some(Ok(Frame::Pong(_))) => self.heartbeat.record_activity(),
                        Some(Ok(Frame::Close)) => {
                            return LinkExit::Failed(WsError::Network("closed by server".into()));
                        }
                        Some(Err(e)) => return LinkExit::Failed(e),
                        None => return LinkExit::Failed(WsError::Network("stream ended".into())),
                    }
                }

                item = outbound.recv() => {
                    let Some(item) = item else {
                        return LinkExit::Shutdown;
                    };
                    if let Err(e) = sink.send(Frame::Text(item.text)).await {
                        self.correlator.complete(item.req_id, Err(e.clone()));
                        return LinkExit::Failed(e);
                    }
                    trace!(req_id = item.req_id, "Request sent");
                }

                _ = ticker.tick() => {
                    match self.heartbeat.check() {
                        HeartbeatAction::Idle => {}
                        HeartbeatAction::SendPing => {
                            let text = match WsRequest::ping().encode(self.correlator.next_id()) {
                                Ok(text) => text,
                                Err(e) => return LinkExit::Failed(e),
                            };
                            if let Err(e) = sink.send(Frame::Text(text)).await {
                                return LinkExit::Failed(e);
                            }
                            self.heartbeat.record_ping();
                        }
                        HeartbeatAction::Expired => {
                            error!("Heartbeat acknowledgements missed");
                            return LinkExit::Failed(WsError::Network(
                                "heartbeat acknowledgements missed".into(),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Fail requests still queued for a link that is gone.
    async fn fail_queued(&self, error: WsError) -> usize {
        let mut outbound = self.outbound_rx.lock().await;
        let mut failed = 0;
        while let Ok(item) = outbound.try_recv() {
            if self.correlator.complete(item.req_id, Err(error.clone())) {
                failed += 1;
            }
        }
        failed
    }

    async fn reconnect(&self, token: &CancellationToken) -> WsResult<Link> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.session.set_state(SessionState::Reconnecting);
            if !self.config.backoff.allows(attempt) {
                return Err(WsError::ConnectionLost {
                    attempts: attempt - 1,
                });
            }
            self.session.update(|info| info.reconnect_attempts = attempt);

            let delay = self.config.backoff.delay(attempt);
            let endpoint = self.config.endpoint_for_attempt(attempt).to_string();
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                %endpoint,
                "Reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => return Err(WsError::Cancelled),
            }

            let result = tokio::select! {
                r = self.establish(&endpoint) => r,
                () = token.cancelled() => return Err(WsError::Cancelled),
            };

            match result {
                Ok(link) => {
                    self.session.update(|info| {
                        info.reconnect_attempts = 0;
                        info.reconnects_total += 1;
                    });
                    self.session.set_state(SessionState::Ready);
                    info!(attempt, "Reconnected");
                    return Ok(link);
                }
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
            }
        }
    }

    fn close_fatally(&self, error: WsError) {
        let snapshot = self.session.snapshot();
        let lost = WsError::ConnectionLost {
            attempts: snapshot.reconnect_attempts,
        };
        let failed = self.correlator.fail_all(lost);
        let report = FatalReport::new(error, snapshot.state, snapshot.last_heartbeat);
        error!(%report, failed_requests = failed, "Session closed");
        self.session.set_state(SessionState::Closed);
        self.session.publish_fatal(report);
    }
}

async fn supervise(shared: Arc<Shared>, mut link: Link, token: CancellationToken) {
    loop {
        match shared.run_link(link, &token).await {
            LinkExit::Shutdown => {
                debug!("Link loop stopped");
                return;
            }
            LinkExit::Failed(err) => {
                warn!(error = %err, "Session link failed");
                shared.session.set_state(SessionState::Reconnecting);
                let stale = shared
                    .fail_queued(WsError::Network("link dropped before request was sent".into()))
                    .await;
                if stale > 0 {
                    debug!(stale, "Failed requests queued for the dropped link");
                }
                match shared.reconnect(&token).await {
                    Ok(next) => link = next,
                    Err(WsError::Cancelled) => {
                        info!("Reconnect cancelled by shutdown");
                        return;
                    }
                    Err(err) => {
                        shared.close_fatally(err);
                        return;
                    }
                }
            }
        }
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Single logical session with the venue.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    supervisor: parking_lot::Mutex<Option<JoinHandle<()>>>,
    lifecycle: TokioMutex<()>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session = SessionCell::new(config.account_type);
        let heartbeat = HeartbeatMonitor::new(config.heartbeat);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                session,
                correlator: Arc::new(Correlator::new()),
                subscriptions: SubscriptionRegistry::new(),
                heartbeat,
                outbound_tx,
                outbound_rx: TokioMutex::new(outbound_rx),
                shutdown_token: parking_lot::Mutex::new(CancellationToken::new()),
            }),
            supervisor: parking_lot::Mutex::new(None),
            lifecycle: TokioMutex::new(()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn session(&self) -> SessionView {
        self.shared.session.view()
    }

    pub fn state(&self) -> SessionState {
        self.shared.session.state()
    }

    pub fn session_info(&self) -> SessionInfo {
        self.shared.session.snapshot()
    }

    pub fn stats(&self) -> TransportStats {
        let info = self.shared.session.snapshot();
        TransportStats {
            state: info.state,
            pending_requests: self.shared.correlator.pending_count(),
            subscriptions: self.shared.subscriptions.len(),
            request_timeouts_total: self.shared.correlator.timeouts_total(),
            reconnects_total: info.reconnects_total,
        }
    }

    /// Open the session: connect, authorize and start the link loop.
    ///
    /// Fails with `Auth` when credentials are malformed or rejected and with
    /// `Network` when the endpoint is unreachable.
    pub async fn connect(&self) -> WsResult<SessionView> {
        let _guard = self.lifecycle.lock().await;
        self.start().await
    }

    async fn start(&self) -> WsResult<SessionView> {
        if self
            .supervisor
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
        {
            return Err(WsError::Validation("session already running".into()));
        }

        let account = self.shared.session.snapshot().account_type;
        if let Err(e) = self.shared.checked_token(account) {
            error!(error = %e, diagnostic = ?diagnostic_of(&e), "Refusing to connect");
            return Err(e);
        }

        let token = CancellationToken::new();
        *self.shared.shutdown_token.lock() = token.clone();
        self.shared.session.clear_fatal();
        self.shared.session.update(|info| info.reconnect_attempts = 0);

        let endpoint = self.shared.config.endpoint_for_attempt(1).to_string();
        let result = tokio::select! {
            r = self.shared.establish(&endpoint) => r,
            () = token.cancelled() => Err(WsError::Cancelled),
        };

        match result {
            Ok(link) => {
                self.shared.session.set_state(SessionState::Ready);
                let handle = tokio::spawn(supervise(self.shared.clone(), link, token));
                *self.supervisor.lock() = Some(handle);
                Ok(self.session())
            }
            Err(e) => {
                if let Some(diag) = diagnostic_of(&e) {
                    error!(error = %e, diagnostic = %diag, "Authentication failed");
                } else if matches!(e, WsError::Cancelled) {
                    info!("Connect cancelled by disconnect");
                } else {
                    error!(error = %e, "Connect failed");
                }
                self.shared.session.set_state(SessionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Queue a correlated request. Returns immediately; await the handle
    /// for the response.
    pub fn send(&self, request: WsRequest) -> WsResult<PendingResponse> {
        let state = self.shared.session.state();
        if state != SessionState::Ready {
            return Err(WsError::NotReady(state));
        }

        let correlator = &self.shared.correlator;
        let (req_id, rx) = correlator.register(request.name());
        let text = match request.encode(req_id) {
            Ok(text) => text,
            Err(e) => {
                correlator.complete(req_id, Err(e.clone()));
                return Err(e);
            }
        };
        if self
            .shared
            .outbound_tx
            .send(Outbound { req_id, text })
            .is_err()
        {
            let err = WsError::ConnectionLost { attempts: 0 };
            correlator.complete(req_id, Err(err.clone()));
            return Err(err);
        }
        debug!(req_id, method = request.name(), "Request queued");

        Ok(PendingResponse::new(
            req_id,
            rx,
            self.shared.config.request_timeout(),
            correlator.clone(),
        ))
    }

    /// Send and wait for the response.
    pub async fn request(&self, request: WsRequest) -> WsResult<Value> {
        self.send(request)?.wait().await
    }

    /// Register `subscriber` for `key` and issue the subscribing request.
    ///
    /// Stream data in the acknowledgement is delivered to the subscriber
    /// before any later stream message.
    pub async fn subscribe(
        &self,
        key: SubscriptionKey,
        request: WsRequest,
        subscriber: Arc<dyn Subscriber>,
    ) -> WsResult<Value> {
        let state = self.shared.session.state();
        if state != SessionState::Ready {
            return Err(WsError::NotReady(state));
        }
        self.shared
            .subscriptions
            .insert(key.clone(), request.clone(), subscriber)?;

        match self.request(request).await {
            Ok(ack) => {
                info!(%key, "Subscribed");
                Ok(ack)
            }
            Err(e) => {
                self.shared.subscriptions.remove(&key);
                warn!(%key, error = %e, "Subscribe failed");
                Err(e)
            }
        }
    }

    /// Remove the subscription for `key` and tell the venue to stop
    /// streaming it.
    pub async fn unsubscribe(&self, key: &SubscriptionKey) -> WsResult<()> {
        let Some(server_id) = self.shared.subscriptions.remove(key) else {
            return Ok(());
        };
        info!(%key, "Unsubscribed");
        if let Some(id) = server_id {
            if self.state() == SessionState::Ready {
                if let Err(e) = self.request(WsRequest::forget(&id)).await {
                    debug!(%key, error = %e, "Forget failed");
                }
            }
        }
        Ok(())
    }

    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.shared.subscriptions.contains(key)
    }

    /// Close the session. Pending requests fail with `Cancelled`. Safe to
    /// call at any point, including during a reconnect or an initial
    /// connect, which then returns `Cancelled`.
    pub async fn disconnect(&self) {
        // connect() holds the lifecycle lock until the handshake finishes;
        // cancel its token first so the lock is released promptly.
        self.shared.shutdown_token.lock().cancel();
        let _guard = self.lifecycle.lock().await;
        self.stop(true).await;
    }

    async fn stop(&self, clear_subscriptions: bool) {
        let token = self.shared.shutdown_token.lock().clone();
        token.cancel();

        let cancelled = self.shared.correlator.fail_all(WsError::Cancelled);

        let handle = self.supervisor.lock().take();
        if let Some(mut handle) = handle {
            let timeout = Duration::from_millis(self.shared.config.disconnect_timeout_ms);
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!("Supervisor did not stop in time, aborting");
                handle.abort();
            }
        }

        let queued = self.shared.fail_queued(WsError::Cancelled).await;
        if clear_subscriptions {
            self.shared.subscriptions.clear();
        }
        if self.shared.session.state() != SessionState::Closed {
            self.shared.session.set_state(SessionState::Disconnected);
        }
        info!(cancelled = cancelled + queued, "Disconnected");
    }

    /// Re-authorize against the other account type. Subscriptions survive
    /// the switch.
    pub async fn switch_account(&self, account: AccountType) -> WsResult<()> {
        let _guard = self.lifecycle.lock().await;
        let current = self.shared.session.snapshot().account_type;
        if current == account {
            return Ok(());
        }
        self.shared.checked_token(account)?;

        info!(from = %current, to = %account, "Switching account");
        self.stop(false).await;
        self.shared.session.update(|info| {
            info.account_type = account;
            info.account = None;
        });
        self.start().await.map(|_| ())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.shutdown_token.lock().cancel();
    }
}

fn diagnostic_of(err: &WsError) -> Option<&TokenDiagnostic> {
    match err {
        WsError::Auth { diagnostic, .. } => diagnostic.as_ref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.app_id, 1089);
        assert_eq!(config.request_timeout_ms, 20_000);
        assert_eq!(config.backoff.max_attempts, 5);
        assert_eq!(config.heartbeat.max_missed, 2);
    }

    #[test]
    fn test_endpoint_rotation() {
        let config = ConnectionConfig::default();
        assert_eq!(config.endpoint_for_attempt(1), DEFAULT_PRIMARY_ENDPOINT);
        assert_eq!(config.endpoint_for_attempt(2), DEFAULT_BACKUP_ENDPOINT);
        assert_eq!(config.endpoint_for_attempt(3), DEFAULT_PRIMARY_ENDPOINT);

        let no_backup = ConnectionConfig {
            backup_url: None,
            ..ConnectionConfig::default()
        };
        assert_eq!(no_backup.endpoint_for_attempt(2), DEFAULT_PRIMARY_ENDPOINT);
    }

    #[test]
    fn test_url_carries_app_id() {
        let config = ConnectionConfig::default();
        assert_eq!(
            config.url(DEFAULT_PRIMARY_ENDPOINT),
            "wss://ws.derivapi.com/websockets/v3?app_id=1089"
        );
    }
}
