//! Application context
//!
//! Owns the process-wide real-time pieces and the notification store.

use std::sync::Arc;

use sincronica_shared::{UserId, ValidationError};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{ConnectionError, NotificationResult};
use crate::notifications::NotificationStore;
use crate::realtime::{ConnectionManager, EnsureOutcome, MessageBus};

/// Shared client state, cheap to clone
#[derive(Clone, Debug)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub bus: MessageBus,
    pub connections: ConnectionManager,
    pub notifications: Arc<NotificationStore>,
}

impl AppContext {
    /// Build the context over the production WebSocket transport
    pub fn new(config: Config) -> NotificationResult<Self> {
        let bus = MessageBus::new();
        let connections = ConnectionManager::websocket(config.socket_url.clone(), bus.clone());
        let notifications = Arc::new(NotificationStore::from_config(&config)?);

        Ok(Self::from_parts(config, bus, connections, notifications))
    }

    /// Assemble a context from already-built pieces
    pub fn from_parts(
        config: Config,
        bus: MessageBus,
        connections: ConnectionManager,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bus,
            connections,
            notifications,
        }
    }

    /// Propagate a login or logout to every component
    ///
    /// On login the notification store switches user and a connection is ensured. On logout
    /// the store is cleared but the live connection is left in place.
    pub fn set_user<U>(&self, user: Option<U>) -> Result<Option<EnsureOutcome>, ConnectionError>
    where
        U: TryInto<UserId>,
        U::Error: Into<ValidationError>,
    {
        let user_id = user
            .map(|u| u.try_into().map_err(|e| ConnectionError::Validation(e.into())))
            .transpose()?;

        self.notifications.set_user(user_id);
        self.connections.on_auth_change(user_id)
    }

    /// Start background notification polling at the configured interval
    pub fn spawn_notification_polling(&self) -> JoinHandle<()> {
        Arc::clone(&self.notifications).spawn_polling(self.config.notifications_poll_interval())
    }
}
