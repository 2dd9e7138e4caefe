//! Wire frames exchanged with the storefront channel service.
//!
//! Inbound frames are `{type, data}` envelopes. Outbound frames are flat: the
//! `type` discriminator sits next to the caller's fields instead of wrapping
//! them in `data`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Emitted after the transport opens.
pub const CONNECTED_EVENT: &str = "connected";
/// Emitted whenever a connection attempt or live connection ends.
pub const DISCONNECTED_EVENT: &str = "disconnected";
/// Emitted on transport failures, with a `{message}` payload.
pub const ERROR_EVENT: &str = "error";

/// Site notification for the signed-in user.
pub const NOTIFICATION_EVENT: &str = "notification";
/// Chat activity summary on the notifications route.
pub const CHAT_EVENT: &str = "chat";
/// Order status change.
pub const ORDER_EVENT: &str = "order";
/// New listing matching a wishlist.
pub const WISHLIST_EVENT: &str = "wishlist";
/// Server answer to the heartbeat.
pub const PONG_EVENT: &str = "pong";
/// New message in a chat room (chat-room route only).
pub const ROOM_MESSAGE_EVENT: &str = "message";
/// Peer typing notice (chat-room route only).
pub const TYPING_EVENT: &str = "typing";

const TYPE_FIELD: &str = "type";
const DATA_FIELD: &str = "data";

/// Errors produced while decoding or encoding channel frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a json object, got {0}")]
    NotAnObject(&'static str),

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("outbound data must be a json object or null, got {0}")]
    InvalidPayload(&'static str),
}

/// Decoded inbound `{type, data}` envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub event_type: String,
    pub data: Value,
}

impl InboundMessage {
    /// Decodes one text frame.
    ///
    /// Frames without a `data` key carry their payload at the top level (the
    /// chat-room `typing` notice does this); the remaining fields become the
    /// payload, or `null` when there are none.
    pub fn from_text(text: &str) -> Result<Self, ProtoError> {
        let mut fields = match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => fields,
            other => return Err(ProtoError::NotAnObject(json_kind(&other))),
        };

        let event_type = match fields.remove(TYPE_FIELD) {
            Some(Value::String(event_type)) => event_type,
            _ => return Err(ProtoError::MissingType),
        };

        let data = match fields.remove(DATA_FIELD) {
            Some(data) => data,
            None if fields.is_empty() => Value::Null,
            None => Value::Object(fields),
        };

        Ok(Self { event_type, data })
    }
}

/// Outbound frame: `{"type": ..}` merged with the caller's fields.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    fields: Map<String, Value>,
}

impl OutboundMessage {
    /// Builds a frame from an event type and a serializable object.
    ///
    /// Fields of `data` are written after `type`, so a `type` key inside
    /// `data` replaces the discriminator. `null` data sends the bare type.
    pub fn new<T>(event_type: &str, data: &T) -> Result<Self, ProtoError>
    where
        T: Serialize + ?Sized,
    {
        let mut fields = Map::new();
        fields.insert(TYPE_FIELD.to_string(), Value::String(event_type.to_string()));

        match serde_json::to_value(data)? {
            Value::Object(extra) => fields.extend(extra),
            Value::Null => {}
            other => return Err(ProtoError::InvalidPayload(json_kind(&other))),
        }

        Ok(Self { fields })
    }

    /// Discriminator that will be sent, after any override from `data`.
    pub fn event_type(&self) -> Option<&str> {
        self.fields.get(TYPE_FIELD).and_then(Value::as_str)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }
}

/// Typed commands understood by the storefront consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Heartbeat; the server answers with `pong`.
    Ping,
    /// Posts a message into the current chat room.
    ChatMessage { content: String },
    /// Tells the other room member that this user is typing.
    Typing,
}

impl ClientCommand {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Chat message broadcast to every member of a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub id: u64,
    pub sender_id: u64,
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    pub content: String,
    /// Server-local timestamp, `YYYY-MM-DD HH:MM:SS`.
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingNotice {
    pub user_id: u64,
    pub username: String,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
