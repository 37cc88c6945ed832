use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Discriminator for wire events exchanged over a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // Client-originated
    Auth,
    Message,
    UserStatus,
    Ping,

    // Server-emitted
    AuthSuccess,
    Pong,

    /// Any type this server does not understand. Decoded rather than rejected
    /// so newer clients do not get their frames dropped as malformed.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Auth => "auth",
            MessageType::Message => "message",
            MessageType::UserStatus => "user_status",
            MessageType::Ping => "ping",
            MessageType::AuthSuccess => "auth_success",
            MessageType::Pong => "pong",
            MessageType::Unknown => "unknown",
        }
    }
}

/// The JSON envelope carried by every text frame.
///
/// Every field except `type` is optional on the wire and unknown fields are
/// ignored, so older and newer clients interoperate. An explicit `null`
/// decodes the same as a missing field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    /// Seconds since the Unix epoch. Zero means "not stamped yet".
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Message {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            content: String::new(),
            user_id: String::new(),
            username: String::new(),
            timestamp: 0,
            data: None,
        }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(frame).map_err(|e| Error::with_source(ErrorKind::Decode, e))
    }

    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::with_source(ErrorKind::Encode, e))
    }

    /// Reply sent to a session after it asserts an identity.
    pub fn auth_success() -> Self {
        Self {
            content: "Authentication successful".to_string(),
            timestamp: now_unix(),
            ..Self::new(MessageType::AuthSuccess)
        }
    }

    pub fn pong() -> Self {
        Self {
            timestamp: now_unix(),
            ..Self::new(MessageType::Pong)
        }
    }

    /// Presence change for `user_id`, fanned out to the other sessions.
    pub fn user_status(user_id: &str, username: &str, is_online: bool) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            timestamp: now_unix(),
            data: Some(json!({ "is_online": is_online })),
            ..Self::new(MessageType::UserStatus)
        }
    }

    /// Wraps an already persisted chat message for real-time delivery.
    /// Web clients read the stored record from `data.message`.
    pub fn stored_message(
        conversation_id: &str,
        sender_id: &str,
        sender_name: &str,
        stored: Value,
    ) -> Self {
        let content = stored
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            content,
            user_id: sender_id.to_string(),
            username: sender_name.to_string(),
            timestamp: now_unix(),
            data: Some(json!({
                "conversation_id": conversation_id,
                "message": stored,
            })),
            ..Self::new(MessageType::Message)
        }
    }

    /// The `is_online` flag of a `user_status` event, if present.
    pub fn is_online(&self) -> Option<bool> {
        self.data
            .as_ref()
            .and_then(|data| data.get("is_online"))
            .and_then(Value::as_bool)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
