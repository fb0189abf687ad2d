//! Real-time messaging support
//!
//! Provides the client side of the chat socket:
//! - A single process-wide connection, shared by every screen that needs it
//! - Presence announcement once the connection is established
//! - In-process fan-out of incoming chat messages
//!
//! # Architecture
//!
//! - **Bus**: Ordered, stoppable publish/subscribe for message events
//! - **Events**: Type-safe frame definitions for client/server communication
//! - **Transport**: Pluggable socket transport, WebSocket in production
//! - **Connection**: Represents an established session
//! - **Manager**: Connection lifecycle, reuse, and error reporting

pub mod bus;
pub mod connection;
pub mod events;
pub mod manager;
pub mod transport;

pub use bus::{Delivery, Dispatch, IntoDispatch, MessageBus, Subscription, SubscriptionId};
pub use connection::SessionInfo;
pub use events::{ClientFrame, ServerFrame};
pub use manager::{
    ConnectTask, ConnectionManager, ConnectionStatus, EnsureOutcome, ErrorSubscription, ObserverId,
};
pub use transport::{LinkPeer, Transport, TransportEvent, TransportLink, WebSocketTransport};
