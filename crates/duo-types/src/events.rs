use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageKind};

/// Events sent from the server to a connected client.
///
/// Frames look like `{"event": "user_status", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Greeting sent once, right after the transport opens
    Connected {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was posted
    NewMessage(Message),

    /// A message was edited or its reaction set changed
    MessageUpdated(Message),

    /// A message was soft-deleted. Carries no content on purpose.
    MessageDeleted { message_id: Uuid },

    /// Ephemeral typing indicator
    UserTyping { username: String, is_typing: bool },

    /// A user came online or went offline
    UserStatus {
        user_id: Uuid,
        is_online: bool,
        last_seen: DateTime<Utc>,
    },

    /// The author's message was read by someone else
    MessageRead { message_id: Uuid, read_by: Uuid },

    /// Something the originating client asked for failed
    Error { kind: ErrorKind, message: String },
}

impl ServerEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::NewMessage(_) => "new_message",
            Self::MessageUpdated(_) => "message_updated",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStatus { .. } => "user_status",
            Self::MessageRead { .. } => "message_read",
            Self::Error { .. } => "error",
        }
    }
}

/// Machine-readable error category carried by [`ServerEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationRequired,
    Unauthorized,
    NotFound,
    InvalidPayload,
    StoreFailure,
    /// Transient store failures persisted through every retry
    StoreUnavailable,
}

/// Events sent from a client to the server.
///
/// The `userId` some clients include on message commands is ignored: the
/// acting user is always the identity bound to the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Authenticate {
        user_id: Uuid,
        username: String,
    },

    SendMessage {
        #[serde(default)]
        content: String,
        #[serde(rename = "type", default)]
        kind: MessageKind,
        file_url: Option<String>,
        file_name: Option<String>,
        file_size: Option<i64>,
    },

    Typing {
        is_typing: bool,
        username: String,
    },

    AddReaction {
        message_id: Uuid,
        emoji: String,
    },

    EditMessage {
        message_id: Uuid,
        content: String,
    },

    DeleteMessage {
        message_id: Uuid,
    },

    MarkRead {
        message_id: Uuid,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::SendMessage { .. } => "send_message",
            Self::Typing { .. } => "typing",
            Self::AddReaction { .. } => "add_reaction",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::MarkRead { .. } => "mark_read",
        }
    }
}
