//! Event names, inbound payloads, and outbound signals.
//!
//! Every named event the chat server exchanges with the client is modelled as
//! a variant here, so observers and emitters are checked at compile time
//! instead of matching on loose strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use sc_core::error::{ScError, ScResult};

/// Names observers can subscribe to.
///
/// `Connect`, `Disconnect` and `ConnectError` are the local diagnostic channel
/// raised by the connection manager. Everything else arrives from the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventName {
    /// A chat message was relayed by the server (`new-message`).
    NewMessage,
    /// A connection was established (`connect`).
    Connect,
    /// The live connection went away (`disconnect`).
    Disconnect,
    /// A connection attempt failed (`connect_error`).
    ConnectError,
    /// Any other server event, kept by name.
    Custom(String),
}

impl EventName {
    /// Parse an event name string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "new-message" => Self::NewMessage,
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "connect_error" => Self::ConnectError,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The event string as used on the wire and in logs.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewMessage => "new-message",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ConnectError => "connect_error",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Whether this is one of the local connection diagnostics.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Connect | Self::Disconnect | Self::ConnectError)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Customer,
    Admin,
}

/// A chat message delivered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Server-assigned message id, when the server includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Room the message belongs to.
    pub chat_room_id: String,
    /// Identity of the sender.
    pub sender_id: String,
    /// Role of the sender.
    pub sender_role: SenderRole,
    /// Message body.
    pub message: String,
    /// Whether the message has been read.
    #[serde(default)]
    pub is_read: bool,
    /// Creation time on the server.
    pub created_at: DateTime<Utc>,
}

/// An event handed to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `new-message` from the server.
    NewMessage(InboundMessage),
    /// Local diagnostic: a handle finished its handshake.
    Connect,
    /// Local diagnostic: the live handle closed.
    Disconnect {
        /// Why the handle closed.
        reason: String,
    },
    /// Local diagnostic: a connection attempt failed.
    ConnectError {
        /// Failure description.
        message: String,
    },
    /// A server event with no typed payload.
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl InboundEvent {
    /// Build an event from a server EVENT packet.
    ///
    /// Diagnostic names are reserved for local use; a server event that uses
    /// one of them is kept as `Custom` rather than impersonating a diagnostic.
    pub fn from_wire(name: &str, data: serde_json::Value) -> ScResult<Self> {
        match name {
            "new-message" => {
                let message: InboundMessage = serde_json::from_value(data).map_err(|e| {
                    ScError::Serialization(format!("invalid new-message payload: {e}"))
                })?;
                Ok(Self::NewMessage(message))
            }
            other => Ok(Self::Custom {
                name: other.to_string(),
                data,
            }),
        }
    }

    /// Name observers of this event are registered under.
    pub fn name(&self) -> EventName {
        match self {
            Self::NewMessage(_) => EventName::NewMessage,
            Self::Connect => EventName::Connect,
            Self::Disconnect { .. } => EventName::Disconnect,
            Self::ConnectError { .. } => EventName::ConnectError,
            Self::Custom { name, .. } => EventName::Custom(name.clone()),
        }
    }

    /// The chat message, if this is a `new-message` event.
    pub fn as_message(&self) -> Option<&InboundMessage> {
        match self {
            Self::NewMessage(m) => Some(m),
            _ => None,
        }
    }
}

/// Outbound signals the client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `join-chat-room`
    JoinChatRoom { chat_room_id: String },
    /// `leave-chat-room`
    LeaveChatRoom { chat_room_id: String },
    /// `send-message`
    SendMessage { chat_room_id: String, message: String },
    /// `mark-as-read`
    MarkAsRead { chat_room_id: String },
}

impl Signal {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChatRoom { .. } => "join-chat-room",
            Self::LeaveChatRoom { .. } => "leave-chat-room",
            Self::SendMessage { .. } => "send-message",
            Self::MarkAsRead { .. } => "mark-as-read",
        }
    }

    /// Room the signal is scoped to.
    pub fn room_id(&self) -> &str {
        match self {
            Self::JoinChatRoom { chat_room_id }
            | Self::LeaveChatRoom { chat_room_id }
            | Self::SendMessage { chat_room_id, .. }
            | Self::MarkAsRead { chat_room_id } => chat_room_id,
        }
    }

    /// Wire payload object.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::SendMessage {
                chat_room_id,
                message,
            } => json!({ "chatRoomId": chat_room_id, "message": message }),
            _ => json!({ "chatRoomId": self.room_id() }),
        }
    }

    /// Rebuild a signal from its wire form. Used by servers and test doubles.
    pub fn from_wire(name: &str, payload: &serde_json::Value) -> ScResult<Self> {
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| ScError::Protocol(format!("{name}: missing string field '{key}'")))
        };
        match name {
            "join-chat-room" => Ok(Self::JoinChatRoom {
                chat_room_id: field("chatRoomId")?,
            }),
            "leave-chat-room" => Ok(Self::LeaveChatRoom {
                chat_room_id: field("chatRoomId")?,
            }),
            "send-message" => Ok(Self::SendMessage {
                chat_room_id: field("chatRoomId")?,
                message: field("message")?,
            }),
            "mark-as-read" => Ok(Self::MarkAsRead {
                chat_room_id: field("chatRoomId")?,
            }),
            other => Err(ScError::Protocol(format!("unknown signal '{other}'"))),
        }
    }
}

/// Connection state for the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle and no reconnection in progress.
    Disconnected,
    /// Opening a handle, either first connect or automatic reconnection.
    Connecting,
    /// A live handle exists.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}
