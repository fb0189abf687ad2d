//! Club Sincrónica client core
//!
//! Real-time messaging (event bus and socket connection manager) and the notification store.

pub mod config;
pub mod error;
pub mod notifications;
pub mod realtime;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{ConnectionError, NotificationError, NotificationResult};
pub use notifications::{NotificationClient, NotificationStore};
pub use realtime::{ConnectionManager, ConnectionStatus, Dispatch, MessageBus, Subscription};
pub use state::AppContext;
