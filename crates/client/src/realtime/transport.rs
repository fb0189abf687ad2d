//! Socket transport
//!
//! The connection manager talks to the network through [`Transport`], which resolves a
//! [`TransportLink`] once the handshake has completed. [`WebSocketTransport`] is the
//! production implementation; tests plug in an in-memory transport built on
//! [`TransportLink::channel`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ConnectionError;

use super::events::{ClientFrame, ServerFrame};

/// What the transport reports to the connection manager
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded server frame
    Frame(ServerFrame),
    /// A text frame that did not decode as a [`ServerFrame`]
    Malformed(String),
    /// Non-fatal transport-level error
    Error(String),
    /// The connection is gone; no further events follow
    Closed,
}

/// Opens real-time connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`. Resolves only after the handshake completed.
    async fn connect(&self, url: &str) -> Result<TransportLink, ConnectionError>;
}

/// Client side of an established connection
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
    /// The transport's own liveness flag
    pub connected: Arc<AtomicBool>,
}

/// Far side of a [`TransportLink`], driven by the transport implementation
#[derive(Debug)]
pub struct LinkPeer {
    pub outbound: mpsc::UnboundedReceiver<ClientFrame>,
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
    pub connected: Arc<AtomicBool>,
}

impl TransportLink {
    /// Create a connected link and the peer that feeds it
    pub fn channel() -> (TransportLink, LinkPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let link = TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
            connected: Arc::clone(&connected),
        };
        let peer = LinkPeer {
            outbound: outbound_rx,
            inbound: inbound_tx,
            connected,
        };
        (link, peer)
    }
}

impl LinkPeer {
    /// Push a server frame to the client
    pub fn deliver(&self, frame: ServerFrame) -> bool {
        self.inbound.send(TransportEvent::Frame(frame)).is_ok()
    }

    /// Report a transport error to the client
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.inbound.send(TransportEvent::Error(reason.into())).is_ok()
    }

    /// Drop the connection from the far side
    pub fn close(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.inbound.send(TransportEvent::Closed);
    }
}

// =============================================================================
// WebSocket transport
// =============================================================================

/// JSON-over-WebSocket transport
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<TransportLink, ConnectionError> {
        let (socket, _response) =
            connect_async(url)
                .await
                .map_err(|e| ConnectionError::Handshake {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        let (mut sender, mut receiver) = socket.split();
        let (link, peer) = TransportLink::channel();
        let LinkPeer {
            outbound: mut outbound_rx,
            inbound,
            connected,
        } = peer;

        // Spawn task to send frames to the server
        let writer_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if sender.send(Message::text(json)).await.is_err() {
                            break; // Connection closed
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Failed to serialize client frame");
                    }
                }
            }

            // Outbound side dropped: the session was closed locally
            writer_connected.store(false, Ordering::Release);
            let _ = sender.send(Message::Close(None)).await;
        });

        // Spawn task to read frames from the server
        tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let event = match serde_json::from_str::<ServerFrame>(text.as_str()) {
                            Ok(frame) => TransportEvent::Frame(frame),
                            Err(_) => TransportEvent::Malformed(text.as_str().to_owned()),
                        };
                        if inbound.send(event).is_err() {
                            break; // Session dropped
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket close frame received");
                        break;
                    }
                    Ok(_) => {} // Control frames handled by tungstenite, binary ignored
                    Err(e) => {
                        let _ = inbound.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            connected.store(false, Ordering::Release);
            let _ = inbound.send(TransportEvent::Closed);
        });

        Ok(link)
    }
}
