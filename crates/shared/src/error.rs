//! Validation errors for the shared data model

use std::convert::Infallible;

use thiserror::Error;

use crate::types::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("Message {message_id} is addressed from user {user_id} to itself")]
    SelfConversation { message_id: i64, user_id: UserId },
}

// Lets `UserId` itself satisfy `TryInto<UserId, Error: Into<ValidationError>>`.
impl From<Infallible> for ValidationError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}
