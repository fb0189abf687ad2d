//! Socket connection manager
//!
//! Keeps at most one live real-time connection per process, whichever screen asks for it.
//!
//! # Lifecycle
//!
//! - **Idle**: nobody is logged in, nothing is attempted.
//! - **Connecting**: a handshake is in flight. Further `ensure_connection` calls reuse it.
//! - **Connected**: the handshake completed and the `join` presence frame was sent.
//! - **Disconnected**: the transport went away (or was torn down). Nothing retries on its
//!   own; the next `ensure_connection` call starts a fresh handshake.
//! - **Error**: the last handshake failed. Same recovery as `Disconnected`.
//!
//! Connection errors never escape the manager. They are logged and handed to the observers
//! registered with [`ConnectionManager::on_error`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use sincronica_shared::{UserId, ValidationError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ConnectionError;

use super::bus::MessageBus;
use super::connection::{Session, SessionInfo};
use super::events::{ClientFrame, ServerFrame};
use super::transport::{Transport, TransportEvent, TransportLink, WebSocketTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Result of [`ConnectionManager::ensure_connection`]
#[derive(Debug)]
pub enum EnsureOutcome {
    /// A live or in-flight connection already exists; no handshake was started
    Reused,
    /// A new handshake was started
    Connecting(ConnectTask),
}

type ErrorObserver = dyn Fn(&ConnectionError) + Send + Sync;

/// Identity of a registered error observer
pub type ObserverId = u64;

struct ManagerState {
    status: ConnectionStatus,
    session: Option<Arc<Session>>,
    reader: Option<JoinHandle<()>>,
    /// Generation of the most recent connection attempt
    attempt: u64,
}

struct Inner {
    url: String,
    transport: Arc<dyn Transport>,
    bus: MessageBus,
    state: Mutex<ManagerState>,
    observers: RwLock<Vec<(ObserverId, Arc<ErrorObserver>)>>,
    next_observer_id: AtomicU64,
    handshakes: AtomicU64,
}

/// Owns the process-wide real-time connection
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager that connects to `url` through `transport` and publishes inbound
    /// messages on `bus`
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>, bus: MessageBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                transport,
                bus,
                state: Mutex::new(ManagerState {
                    status: ConnectionStatus::Idle,
                    session: None,
                    reader: None,
                    attempt: 0,
                }),
                observers: RwLock::new(Vec::new()),
                next_observer_id: AtomicU64::new(0),
                handshakes: AtomicU64::new(0),
            }),
        }
    }

    /// Manager over the production WebSocket transport
    pub fn websocket(url: impl Into<String>, bus: MessageBus) -> Self {
        Self::new(url, Arc::new(WebSocketTransport::new()), bus)
    }

    /// Make sure a live connection exists for the logged-in user
    ///
    /// Idempotent: a connected or connecting session is reused. Otherwise a handshake task
    /// is spawned on the current Tokio runtime and the `join` frame is sent once it
    /// completes. Only invalid input and a missing Tokio runtime are returned here; network
    /// failures go to the error observers.
    pub fn ensure_connection<U>(&self, user: U) -> Result<EnsureOutcome, ConnectionError>
    where
        U: TryInto<UserId>,
        U::Error: Into<ValidationError>,
    {
        let user_id = user
            .try_into()
            .map_err(|e| ConnectionError::Validation(e.into()))?;
        let runtime = Handle::try_current()
            .map_err(|_| ConnectionError::NoRuntime)?;

        let mut state = self.inner.lock_state();
        match state.status {
            ConnectionStatus::Connecting => {
                tracing::debug!(user_id = %user_id, "Handshake already in flight, reusing it");
                return Ok(EnsureOutcome::Reused);
            }
            ConnectionStatus::Connected => {
                if let Some(session) = state.session.as_ref().filter(|s| s.is_connected()) {
                    if session.user_id != user_id {
                        tracing::warn!(
                            session_id = %session.session_id,
                            session_user_id = %session.user_id,
                            requested_user_id = %user_id,
                            "Live connection belongs to another user, reusing it"
                        );
                    } else {
                        tracing::debug!(
                            session_id = %session.session_id,
                            user_id = %user_id,
                            "Reusing live connection"
                        );
                    }
                    return Ok(EnsureOutcome::Reused);
                }
                // Transport dropped without the reader noticing yet
                state.status = ConnectionStatus::Disconnected;
            }
            ConnectionStatus::Idle | ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
        }

        state.status = ConnectionStatus::Connecting;
        state.attempt += 1;
        let attempt = state.attempt;
        drop(state);

        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move { inner.connect(user_id, attempt).await });

        Ok(EnsureOutcome::Connecting(ConnectTask {
            attempt,
            handle,
            inner: Arc::downgrade(&self.inner),
        }))
    }

    /// React to the authenticated user changing
    ///
    /// Login ensures a connection. Logout leaves any live session alone: the screen that
    /// owns the messaging UI decides when to [`disconnect`](Self::disconnect).
    pub fn on_auth_change<U>(&self, user: Option<U>) -> Result<Option<EnsureOutcome>, ConnectionError>
    where
        U: TryInto<UserId>,
        U::Error: Into<ValidationError>,
    {
        match user {
            Some(user) => self.ensure_connection(user).map(Some),
            None => {
                let mut state = self.inner.lock_state();
                match state.status {
                    ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                        tracing::info!(
                            status = ?state.status,
                            "User logged out, leaving real-time connection to its owner"
                        );
                    }
                    _ => state.status = ConnectionStatus::Idle,
                }
                Ok(None)
            }
        }
    }

    /// Tear down the connection. Returns false if there was nothing to tear down.
    pub fn disconnect(&self) -> bool {
        let mut state = self.inner.lock_state();
        let had_attempt = state.status == ConnectionStatus::Connecting;

        // Invalidate any in-flight handshake
        state.attempt += 1;
        if let Some(reader) = state.reader.take() {
            reader.abort();
        }
        let session = state.session.take();
        state.status = ConnectionStatus::Disconnected;
        drop(state);

        match session {
            Some(session) => {
                session.close();
                tracing::info!(
                    session_id = %session.session_id,
                    user_id = %session.user_id,
                    "Real-time connection torn down"
                );
                true
            }
            None => had_attempt,
        }
    }

    /// Send a chat message over the live connection
    pub fn send_message(
        &self,
        conversation_id: i64,
        receiver_id: UserId,
        text: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        let session = self.live_session().ok_or(ConnectionError::NotConnected)?;
        session.send(ClientFrame::SendMessage {
            conversation_id,
            receiver_id,
            text: text.into(),
        })
    }

    /// Register a callback that receives every connection error
    ///
    /// The callback stays registered until [`ErrorSubscription::remove`] is called.
    pub fn on_error<F>(&self, observer: F) -> ErrorSubscription
    where
        F: Fn(&ConnectionError) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));

        ErrorSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock_state().status
    }

    /// Whether a session exists and its transport reports connected
    pub fn is_connected(&self) -> bool {
        self.live_session().is_some()
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.live_session().map(|s| s.info())
    }

    /// Number of handshakes started since creation
    pub fn handshake_count(&self) -> u64 {
        self.inner.handshakes.load(Ordering::Relaxed)
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    fn live_session(&self) -> Option<Arc<Session>> {
        let state = self.inner.lock_state();
        state
            .session
            .as_ref()
            .filter(|s| s.is_connected())
            .cloned()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.url)
            .field("status", &self.status())
            .field("handshakes", &self.handshake_count())
            .finish()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log an error and hand it to every observer
    fn report(&self, err: &ConnectionError) {
        tracing::error!(
            url = %self.url,
            error = %err,
            transient = err.is_transient(),
            "Real-time connection error"
        );

        let observers: Vec<Arc<ErrorObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(err);
        }
    }

    async fn connect(
        self: Arc<Self>,
        user_id: UserId,
        attempt: u64,
    ) -> Result<SessionInfo, ConnectionError> {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(user_id = %user_id, url = %self.url, "Opening real-time connection");

        let link = match self.transport.connect(&self.url).await {
            Ok(link) => link,
            Err(err) => {
                {
                    let mut state = self.lock_state();
                    if state.attempt == attempt {
                        state.status = ConnectionStatus::Error;
                    }
                }
                self.report(&err);
                return Err(err);
            }
        };

        let TransportLink {
            outbound,
            inbound,
            connected,
        } = link;
        let session = Arc::new(Session::new(user_id, outbound, connected));

        let joined = {
            let mut state = self.lock_state();
            if state.attempt != attempt || state.status != ConnectionStatus::Connecting {
                drop(state);
                session.close();
                tracing::info!(user_id = %user_id, "Handshake finished after being cancelled");
                return Err(ConnectionError::Cancelled);
            }
            state.status = ConnectionStatus::Connected;
            state.session = Some(Arc::clone(&session));
            state.reader = Some(tokio::spawn(
                Arc::clone(&self).read_loop(Arc::clone(&session), inbound),
            ));

            // Queued under the state lock: no other frame can reach this session before it
            session.send(ClientFrame::Join { user_id })
        };

        tracing::info!(
            session_id = %session.session_id,
            user_id = %user_id,
            "Real-time connection established"
        );

        match joined {
            Ok(()) => {
                tracing::info!(
                    session_id = %session.session_id,
                    user_id = %user_id,
                    "Announced presence"
                );
            }
            Err(err) => self.report(&err),
        }

        Ok(session.info())
    }

    async fn read_loop(
        self: Arc<Self>,
        session: Arc<Session>,
        mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = inbound.recv().await {
            match event {
                TransportEvent::Frame(ServerFrame::NewMessage { message }) => {
                    if let Err(err) = self.bus.publish(&message) {
                        tracing::warn!(
                            session_id = %session.session_id,
                            message_id = message.id,
                            error = %err,
                            "Dropped inbound message"
                        );
                    }
                }
                TransportEvent::Frame(ServerFrame::Error { message }) => {
                    self.report(&ConnectionError::Protocol(message));
                }
                TransportEvent::Malformed(raw) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        frame = %raw,
                        "Failed to parse server frame"
                    );
                }
                TransportEvent::Error(reason) => {
                    self.report(&ConnectionError::Transport(reason));
                }
                TransportEvent::Closed => break,
            }
        }

        session.mark_disconnected();
        {
            let mut state = self.lock_state();
            let current = state
                .session
                .as_ref()
                .is_some_and(|s| Arc::ptr_eq(s, &session));
            if current {
                state.status = ConnectionStatus::Disconnected;
                state.session = None;
                state.reader = None;
            }
        }
        // Ends the transport's writer side as well
        session.close();

        tracing::info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            "Real-time connection closed"
        );
    }
}

/// Capability to remove exactly one error observer
///
/// Dropping it does not remove the observer.
#[derive(Debug, Clone)]
pub struct ErrorSubscription {
    id: ObserverId,
    inner: Weak<Inner>,
}

impl ErrorSubscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Stop receiving errors. Returns false if the observer was already removed.
    pub fn remove(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };

        let mut observers = inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(position) = observers.iter().position(|(id, _)| *id == self.id) else {
            return false;
        };
        observers.remove(position);

        tracing::debug!(
            observer_id = self.id,
            observers = observers.len(),
            "Connection error observer removed"
        );
        true
    }
}

/// Handle to an in-flight handshake
///
/// Dropping it does not cancel the handshake.
pub struct ConnectTask {
    attempt: u64,
    handle: JoinHandle<Result<SessionInfo, ConnectionError>>,
    inner: Weak<Inner>,
}

impl ConnectTask {
    /// Abort the handshake. Has no effect once the connection is established.
    pub fn cancel(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let mut state = inner.lock_state();
        if state.attempt == self.attempt && state.status == ConnectionStatus::Connecting {
            self.handle.abort();
            state.status = ConnectionStatus::Disconnected;
            tracing::info!(attempt = self.attempt, "Real-time handshake cancelled");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the handshake to complete
    pub async fn wait(self) -> Result<SessionInfo, ConnectionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ConnectionError::Cancelled),
            Err(e) => Err(ConnectionError::Transport(format!(
                "handshake task failed: {e}"
            ))),
        }
    }
}

impl fmt::Debug for ConnectTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTask")
            .field("attempt", &self.attempt)
            .field("finished", &self.is_finished())
            .finish()
    }
}
