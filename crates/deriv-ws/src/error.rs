//! WebSocket session error types.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::credentials::TokenDiagnostic;
use crate::session::SessionState;

#[derive(Debug, Clone, Error)]
pub enum WsError {
    /// Transient transport failure; the session recovers by reconnecting.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials rejected. Fatal for the session, never retried.
    #[error("Authentication failed: {message}")]
    Auth {
        message: String,
        diagnostic: Option<TokenDiagnostic>,
    },

    #[error("Request {req_id} timed out")]
    RequestTimeout { req_id: u64 },

    #[error("Connection lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },

    #[error("Cancelled by disconnect")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Session not ready (state={0})")]
    NotReady(SessionState),

    #[error("Already subscribed to {0}")]
    DuplicateSubscription(String),
}

impl WsError {
    /// Errors that end the session and halt trading.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::ConnectionLost { .. })
    }

    /// Errors the caller may retry once the session is ready again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RequestTimeout { .. } | Self::NotReady(_)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for WsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

pub type WsResult<T> = Result<T, WsError>;

/// Top-level report for a fatal session condition.
#[derive(Debug, Clone)]
pub struct FatalReport {
    pub error: WsError,
    pub state: SessionState,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub token_diagnostic: Option<TokenDiagnostic>,
}

impl FatalReport {
    pub fn new(error: WsError, state: SessionState, last_heartbeat: Option<DateTime<Utc>>) -> Self {
        let token_diagnostic = match &error {
            WsError::Auth { diagnostic, .. } => diagnostic.clone(),
            _ => None,
        };
        Self {
            error,
            state,
            last_heartbeat,
            token_diagnostic,
        }
    }
}

impl fmt::Display for FatalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (state={}", self.error, self.state)?;
        match self.last_heartbeat {
            Some(ts) => write!(f, ", last_heartbeat={}", ts.to_rfc3339())?,
            None => write!(f, ", last_heartbeat=never")?,
        }
        write!(f, ")")?;
        if let Some(diag) = &self.token_diagnostic {
            write!(f, "; token: {diag}")?;
        }
        Ok(())
    }
}
