//! Real-time frame types and serialization
//!
//! Defines the client-to-server and server-to-client frames exchanged over the socket
//! with type-safe serde serialization.

use serde::{Deserialize, Serialize};
use sincronica_shared::{MessageEvent, UserId};

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frames sent from this client to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Presence announcement; the server routes messages for `user_id` to this session
    Join { user_id: UserId },

    /// Send a chat message in a direct conversation
    SendMessage {
        conversation_id: i64,
        receiver_id: UserId,
        text: String,
    },
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// Frames sent from the server to this client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// New chat message addressed to the joined user
    NewMessage { message: MessageEvent },

    /// Error message
    Error { message: String },
}
