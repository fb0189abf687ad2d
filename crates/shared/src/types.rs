//! Common types used across Club Sincrónica

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::error::ValidationError;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
///
/// Always a positive integer. Ids that arrive as strings (route params, storage,
/// loosely typed payloads) are coerced to integers when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Result<Self, ValidationError> {
        if id > 0 {
            Ok(Self(id))
        } else {
            Err(ValidationError::InvalidUserId(id.to_string()))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidUserId(s.to_string()))?;
        Self::new(id)
    }
}

impl TryFrom<i64> for UserId {
    type Error = ValidationError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl TryFrom<&str> for UserId {
    type Error = ValidationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(id) => UserId::new(id),
            Raw::Str(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Messaging
// =============================================================================

/// One chat message observed in real time
///
/// Built by the transport layer when a frame arrives and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Unique within its conversation
    pub id: i64,
    #[serde(alias = "conversationId")]
    pub conversation_id: i64,
    #[serde(alias = "senderId")]
    pub sender_id: UserId,
    #[serde(alias = "receiverId")]
    pub receiver_id: UserId,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "senderName")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "senderAvatar")]
    pub sender_avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339", alias = "createdAt")]
    pub created_at: OffsetDateTime,
}

impl MessageEvent {
    /// Reject direct-conversation events addressed from a user to itself
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sender_id == self.receiver_id {
            return Err(ValidationError::SelfConversation {
                message_id: self.id,
                user_id: self.sender_id,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Server-persisted, per-user notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    #[serde(alias = "userId")]
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(alias = "is_read", alias = "isRead")]
    pub read: bool,
    #[serde(with = "time::serde::rfc3339", alias = "createdAt")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        !self.read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn message(sender: i64, receiver: i64) -> MessageEvent {
        MessageEvent {
            id: 7,
            conversation_id: 3,
            sender_id: UserId::new(sender).unwrap(),
            receiver_id: UserId::new(receiver).unwrap(),
            text: "hola".to_string(),
            sender_name: None,
            sender_avatar: None,
            created_at: datetime!(2024-05-01 12:00 UTC),
        }
    }

    #[test]
    fn test_user_id_coerces_numeric_strings() {
        assert_eq!("42".parse::<UserId>().unwrap().get(), 42);
        assert_eq!(UserId::try_from(" 42 ").unwrap().get(), 42);
        assert_eq!(UserId::try_from(String::from("9")).unwrap().get(), 9);
    }

    #[test]
    fn test_user_id_rejects_non_positive_and_garbage() {
        assert!(UserId::new(0).is_err());
        assert!(UserId::new(-5).is_err());
        assert!(matches!(
            "abc".parse::<UserId>(),
            Err(ValidationError::InvalidUserId(s)) if s == "abc"
        ));
    }

    #[test]
    fn test_user_id_deserializes_from_number_or_string() {
        let from_int: UserId = serde_json::from_str("42").unwrap();
        let from_str: UserId = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(from_int, from_str);
        assert!(serde_json::from_str::<UserId>("0").is_err());
        assert_eq!(serde_json::to_string(&from_int).unwrap(), "42");
    }

    #[test]
    fn test_message_event_self_conversation_is_invalid() {
        assert!(message(1, 2).validate().is_ok());
        match message(5, 5).validate() {
            Err(ValidationError::SelfConversation { message_id, user_id }) => {
                assert_eq!(message_id, 7);
                assert_eq!(user_id.get(), 5);
            }
            other => panic!("Expected SelfConversation, got {:?}", other),
        }
    }

    #[test]
    fn test_message_event_accepts_camel_case_frames() {
        let json = r#"{
            "id": 11,
            "conversationId": 4,
            "senderId": "8",
            "receiverId": 9,
            "content": "¿vienes hoy?",
            "senderName": "Lucía",
            "createdAt": "2024-05-01T12:30:00.000Z"
        }"#;
        let event: MessageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.sender_id.get(), 8);
        assert_eq!(event.text, "¿vienes hoy?");
        assert_eq!(event.sender_name.as_deref(), Some("Lucía"));
        assert_eq!(event.sender_avatar, None);
        assert_eq!(event.created_at, datetime!(2024-05-01 12:30 UTC));
    }

    #[test]
    fn test_notification_deserialization() {
        let json = r#"{
            "id": 1,
            "user_id": 42,
            "title": "Bienvenida",
            "message": "Tu cuenta está lista",
            "type": "success",
            "read": false,
            "created_at": "2024-05-01T08:00:00Z"
        }"#;
        let notification: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.kind, NotificationType::Success);
        assert!(notification.is_unread());
        assert_eq!(notification.kind.as_str(), "success");
    }
}
