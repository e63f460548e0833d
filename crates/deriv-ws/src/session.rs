//! Session state owned by the connection manager.
//!
//! Only the manager's state machine holds a [`SessionCell`]; every other
//! component reads through a cloned [`SessionView`].

use chrono::{DateTime, Utc};
use deriv_core::{AccountType, Money};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::FatalReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Reconnecting,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    pub const ALL: [SessionState; 6] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Authenticating,
        Self::Ready,
        Self::Reconnecting,
        Self::Closed,
    ];
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account details returned by `authorize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountInfo {
    pub login_id: String,
    pub currency: String,
    pub balance: Money,
    pub is_virtual: bool,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub state: SessionState,
    pub account_type: AccountType,
    pub account: Option<AccountInfo>,
    pub endpoint: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Attempts made by the current reconnect cycle (0 when Ready).
    pub reconnect_attempts: u32,
    /// Successful reconnects since the session was opened.
    pub reconnects_total: u64,
}

impl SessionInfo {
    fn new(account_type: AccountType) -> Self {
        Self {
            state: SessionState::Disconnected,
            account_type,
            account: None,
            endpoint: None,
            last_heartbeat: None,
            reconnect_attempts: 0,
            reconnects_total: 0,
        }
    }
}

/// Mutable side of the session. Crate-private.
pub(crate) struct SessionCell {
    info: Arc<RwLock<SessionInfo>>,
    state_tx: watch::Sender<SessionState>,
    fatal_tx: watch::Sender<Option<FatalReport>>,
}

impl SessionCell {
    pub(crate) fn new(account_type: AccountType) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (fatal_tx, _) = watch::channel(None);
        Self {
            info: Arc::new(RwLock::new(SessionInfo::new(account_type))),
            state_tx,
            fatal_tx,
        }
    }

    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            info: self.info.clone(),
            state_rx: self.state_tx.subscribe(),
            fatal_rx: self.fatal_tx.subscribe(),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.info.read().state
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = {
            let mut info = self.info.write();
            std::mem::replace(&mut info.state, state)
        };
        if previous != state {
            tracing::info!(from = %previous, to = %state, "Session state changed");
        }
        self.state_tx.send_replace(state);
    }

    pub(crate) fn update<F: FnOnce(&mut SessionInfo)>(&self, f: F) {
        f(&mut self.info.write());
    }

    pub(crate) fn snapshot(&self) -> SessionInfo {
        self.info.read().clone()
    }

    pub(crate) fn publish_fatal(&self, report: FatalReport) {
        self.fatal_tx.send_replace(Some(report));
    }

    pub(crate) fn clear_fatal(&self) {
        self.fatal_tx.send_replace(None);
    }
}

/// Read-only handle to the session.
#[derive(Clone)]
pub struct SessionView {
    info: Arc<RwLock<SessionInfo>>,
    state_rx: watch::Receiver<SessionState>,
    fatal_rx: watch::Receiver<Option<FatalReport>>,
}

impl SessionView {
    pub fn state(&self) -> SessionState {
        self.info.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn account_type(&self) -> AccountType {
        self.info.read().account_type
    }

    pub fn account(&self) -> Option<AccountInfo> {
        self.info.read().account.clone()
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.info.read().last_heartbeat
    }

    pub fn snapshot(&self) -> SessionInfo {
        self.info.read().clone()
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// The fatal report, once the session has died.
    pub fn fatal(&self) -> Option<FatalReport> {
        self.fatal_rx.borrow().clone()
    }

    /// Resolve when a fatal report is published.
    pub async fn wait_fatal(&self) -> Option<FatalReport> {
        let mut rx = self.fatal_rx.clone();
        let report = match rx.wait_for(|r| r.is_some()).await {
            Ok(report) => report.clone(),
            Err(_) => None,
        };
        report
    }

    /// Wait until the session reaches `state`, up to `timeout`.
    pub async fn wait_for_state(&self, state: SessionState, timeout: Duration) -> bool {
        let mut rx = self.state_rx.clone();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == state))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

impl fmt::Debug for SessionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionView")
            .field("info", &*self.info.read())
            .finish()
    }
}
