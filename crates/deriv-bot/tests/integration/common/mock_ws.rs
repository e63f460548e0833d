//! Mock Deriv WebSocket server for integration tests.
//!
//! Speaks just enough of the API for a session to come up:
//! - `authorize` (optionally rejecting every token)
//! - `ping`, `balance` and single-tick `ticks_history`
//! - Records every received request
//! - Can drop all open connections to force a reconnect

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
struct ServerState {
    messages: Mutex<Vec<Value>>,
    connections: Mutex<u32>,
    reject_auth: AtomicBool,
    kick: Notify,
}

/// A mock Deriv WebSocket server.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    state: Arc<ServerState>,
}

impl MockWsServer {
    /// Start a new mock server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, state_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            state,
        }
    }

    /// Endpoint URL, without the `app_id` query the client appends.
    pub fn url(&self) -> String {
        format!("ws://{}/websockets/v3", self.addr)
    }

    pub fn reject_auth(&self, reject: bool) {
        self.state.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// Close every open connection from the server side.
    pub fn drop_connections(&self) {
        self.state.kick.notify_waiters();
    }

    pub async fn connection_count(&self) -> u32 {
        *self.state.connections.lock().await
    }

    /// Requests received, in order.
    pub async fn received(&self) -> Vec<Value> {
        self.state.messages.lock().await.clone()
    }

    /// Requests whose first key is `method`.
    pub async fn received_method(&self, method: &str) -> usize {
        self.received()
            .await
            .iter()
            .filter(|m| m.get(method).is_some())
            .count()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {e}");
            return;
        }
    };
    *state.connections.lock().await += 1;

    let (mut write, mut read) = ws_stream.split();

    loop {
        let msg = tokio::select! {
            msg = read.next() => msg,
            () = state.kick.notified() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let Ok(request) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                state.messages.lock().await.push(request.clone());
                let response = respond(&request, state.reject_auth.load(Ordering::SeqCst));
                if write.send(Message::Text(response.to_string())).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            _ => {}
        }
    }
}

fn respond(request: &Value, reject_auth: bool) -> Value {
    let mut body = if request.get("authorize").is_some() {
        if reject_auth {
            json!({
                "msg_type": "authorize",
                "error": { "code": "InvalidToken", "message": "The token is invalid." }
            })
        } else {
            json!({
                "msg_type": "authorize",
                "authorize": {
                    "loginid": "VRTC1000001",
                    "currency": "USD",
                    "balance": 10000.0,
                    "is_virtual": 1
                }
            })
        }
    } else if request.get("ping").is_some() {
        json!({ "msg_type": "ping", "ping": "pong" })
    } else if request.get("balance").is_some() {
        json!({ "msg_type": "balance", "balance": { "balance": 10000.0, "currency": "USD" } })
    } else if request.get("ticks_history").is_some() {
        json!({
            "msg_type": "history",
            "history": { "prices": [1234.56], "times": [1700000000] }
        })
    } else {
        json!({
            "msg_type": "error",
            "error": { "code": "UnrecognisedRequest", "message": "Unrecognised request" }
        })
    };

    body["echo_req"] = request.clone();
    if let Some(req_id) = request.get("req_id") {
        body["req_id"] = req_id.clone();
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }

    #[test]
    fn test_respond_echoes_req_id() {
        let reply = respond(&json!({ "ping": 1, "req_id": 7 }), false);
        assert_eq!(reply["req_id"], 7);
        assert_eq!(reply["ping"], "pong");
    }
}
