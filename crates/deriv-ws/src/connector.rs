//! Link establishment.
//!
//! The connection manager never touches sockets directly. It asks a
//! [`Connector`] for a [`Link`], a framed sink/stream pair. The live
//! connector dials the venue over TLS; the simulated connector hands out
//! in-memory links to a local venue.

use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio_tungstenite::connect_async_tls_with_config;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::error::{WsError, WsResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = WsError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = WsResult<Frame>> + Send>>;

/// One established connection.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens links to an endpoint URL.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, WsResult<Link>>;
}

// ============================================================================
// LiveConnector
// ============================================================================

/// WebSocket connector for the real venue.
#[derive(Debug, Clone)]
pub struct LiveConnector {
    connect_timeout: Duration,
}

impl LiveConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for LiveConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

impl Connector for LiveConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, WsResult<Link>> {
        Box::pin(async move {
            info!(%url, "Connecting to WebSocket");
            // TCP_NODELAY on; ticks are small and latency matters more than batching.
            let (ws_stream, _response) = tokio::time::timeout(
                self.connect_timeout,
                connect_async_tls_with_config(url, None, true, None),
            )
            .await
            .map_err(|_| {
                WsError::Network(format!(
                    "connect timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })??;
            let (write, read) = ws_stream.split();

            let sink = write.with(|frame: Frame| future::ready(Ok::<_, WsError>(to_message(frame))));
            let stream = read.filter_map(|msg| future::ready(from_message(msg)));

            debug!("WebSocket link established");
            Ok(Link::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<WsResult<Frame>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Ping(data)) => Some(Ok(Frame::Ping(data))),
        Ok(Message::Pong(data)) => Some(Ok(Frame::Pong(data))),
        Ok(Message::Close(frame)) => {
            if let Some(f) = frame {
                debug!(code = u16::from(f.code), reason = %f.reason, "Close frame received");
            }
            Some(Ok(Frame::Close))
        }
        Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => None,
        Err(e) => Some(Err(e.into())),
    }
}
