//! Real-time connection session
//!
//! Represents the single live connection for the logged-in user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sincronica_shared::UserId;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ConnectionError;

use super::events::ClientFrame;

/// Identifying data of a session, cheap to hand out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user_id: UserId,
}

/// Represents an established real-time connection
#[derive(Debug)]
pub struct Session {
    /// Local id, used to correlate log lines
    pub session_id: Uuid,

    /// User the presence frame was sent for
    pub user_id: UserId,

    /// Channel to send frames to the server; `None` once closed locally
    sender: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,

    /// Liveness flag owned by the transport
    connected: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        user_id: UserId,
        sender: mpsc::UnboundedSender<ClientFrame>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            sender: Mutex::new(Some(sender)),
            connected,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            user_id: self.user_id,
        }
    }

    /// Whether the transport still reports this connection as live
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
            && self
                .sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|s| !s.is_closed())
    }

    /// Send a frame to the server
    pub fn send(&self, frame: ClientFrame) -> Result<(), ConnectionError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ConnectionError::NotConnected);
        }

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref().ok_or(ConnectionError::NotConnected)?;
        sender
            .send(frame)
            .map_err(|_| ConnectionError::NotConnected)
    }

    /// Record that the transport went away
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Close the session locally. The transport sees its outbound side end.
    pub fn close(&self) {
        self.mark_disconnected();
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            tracing::debug!(
                session_id = %self.session_id,
                user_id = %self.user_id,
                "Closed real-time session"
            );
        }
    }
}
