//! Transport abstraction
//!
//! A transport is a message-oriented duplex channel. Opening one yields a
//! [`TransportHandle`]: a sender for outbound text/close and a receiver of
//! inbound text, close and error notifications. The session never sees the
//! socket itself, so tests can stand in for the gateway with plain channels.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Capacity of each transport channel
const CHANNEL_CAPACITY: usize = 256;

/// Message from the client to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one text message
    Text(String),
    /// Close the transport
    Close {
        /// Close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Notification from the transport to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One text message arrived
    Text(String),
    /// Transport closed; nothing follows
    Closed {
        /// Close code (1006 when the peer vanished without one)
        code: u16,
        /// Close reason
        reason: String,
    },
    /// Transport reported an error; a `Closed` usually follows
    Error(String),
}

/// An open transport
#[derive(Debug)]
pub struct TransportHandle {
    /// Outbound messages
    pub outbound: mpsc::Sender<Outbound>,
    /// Inbound notifications
    pub inbound: mpsc::Receiver<Inbound>,
}

/// Opens transports to the gateway
///
/// Each call returns a fresh transport; a handle is never reused across
/// connection attempts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `url`
    async fn open(&self, url: &Url) -> Result<TransportHandle>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector
    pub fn new() -> Self {
        WebSocketConnector
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<TransportHandle> {
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Transport(format!("Failed to connect to {}: {}", url, e)))?;
        debug!("WebSocket open: {}", url);

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Inbound>(CHANNEL_CAPACITY);

        // Writer: drains outbound until a close is requested or the client drops the sender
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                match msg {
                    Outbound::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!("WebSocket send failed: {}", e);
                            break;
                        }
                    }
                    Outbound::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            debug!("WebSocket close failed: {}", e);
                        }
                        break;
                    }
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forwards text and always finishes with exactly one Closed
        tokio::spawn(async move {
            let closed = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(Inbound::Text(text.as_str().to_string())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            if in_tx.send(Inbound::Text(text)).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => warn!("Dropping non-UTF-8 binary message ({} bytes)", bytes.len()),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => Inbound::Closed {
                                code: u16::from(frame.code),
                                reason: frame.reason.as_str().to_string(),
                            },
                            None => Inbound::Closed {
                                code: 1005,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = in_tx.send(Inbound::Error(e.to_string())).await;
                        break Inbound::Closed {
                            code: 1006,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break Inbound::Closed {
                            code: 1006,
                            reason: "connection lost".to_string(),
                        };
                    }
                }
            };
            let _ = in_tx.send(closed).await;
        });

        Ok(TransportHandle {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// In-memory connector for tests: every `open` hands the far end of a
/// fresh channel pair to the test through `accepted`.
#[cfg(test)]
pub(crate) mod loopback {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// The gateway side of one loopback transport
    pub(crate) struct RemoteEnd {
        pub(crate) from_client: mpsc::Receiver<Outbound>,
        pub(crate) to_client: mpsc::Sender<Inbound>,
    }

    impl RemoteEnd {
        /// Send one raw text message to the client
        pub(crate) async fn send_text(&self, text: impl Into<String>) {
            let _ = self.to_client.send(Inbound::Text(text.into())).await;
        }

        /// Send a JSON value to the client
        pub(crate) async fn send_json(&self, value: serde_json::Value) {
            self.send_text(value.to_string()).await;
        }

        /// Close from the gateway side
        pub(crate) async fn close(&self, code: u16) {
            let _ = self
                .to_client
                .send(Inbound::Closed {
                    code,
                    reason: String::new(),
                })
                .await;
        }

        /// Next text frame the client sent, parsed as JSON
        pub(crate) async fn next_json(&mut self) -> Option<serde_json::Value> {
            loop {
                match self.from_client.recv().await? {
                    Outbound::Text(text) => return serde_json::from_str(&text).ok(),
                    Outbound::Close { .. } => return None,
                }
            }
        }

        /// Wait for the client to close, returning the close code
        pub(crate) async fn next_close(&mut self) -> Option<u16> {
            loop {
                match self.from_client.recv().await? {
                    Outbound::Text(_) => continue,
                    Outbound::Close { code, .. } => return Some(code),
                }
            }
        }
    }

    #[derive(Clone)]
    pub(crate) struct LoopbackConnector {
        accepted: mpsc::UnboundedSender<RemoteEnd>,
        refuse: Arc<AtomicBool>,
    }

    impl LoopbackConnector {
        pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                LoopbackConnector {
                    accepted: tx,
                    refuse: Arc::new(AtomicBool::new(false)),
                },
                rx,
            )
        }

        /// Make subsequent `open` calls fail
        pub(crate) fn set_refuse(&self, refuse: bool) {
            self.refuse.store(refuse, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Connector for LoopbackConnector {
        async fn open(&self, url: &Url) -> Result<TransportHandle> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(Error::Transport(format!("connection refused: {}", url)));
            }
            let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
            let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
            self.accepted
                .send(RemoteEnd {
                    from_client: out_rx,
                    to_client: in_tx,
                })
                .map_err(|_| Error::Transport("loopback listener gone".to_string()))?;
            Ok(TransportHandle {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }
}
