//! Database row types. These map directly to SQLite rows.
//! Conversion into the wire models in duo-types happens here so callers
//! never see raw column strings.

use duo_types::models::{
    Attachment, Message, MessageKind, PublicProfile, Reaction, ReactionUser, User,
};
use tracing::warn;
use uuid::Uuid;

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub name: String,
    pub is_online: bool,
    pub last_seen: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub user_id: String,
    pub author_username: String,
    pub author_name: String,
    pub content: String,
    pub kind: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: String,
    pub is_edited: bool,
    pub edited_at: Option<String>,
    pub is_deleted: bool,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub username: String,
    pub emoji: String,
}

/// Everything the gateway supplies when persisting a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub attachment: Option<Attachment>,
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: parse_id(&row.id, "user id"),
            username: row.username,
            name: row.name,
            is_online: row.is_online,
            last_seen: row.last_seen.as_deref().map(parse_timestamp),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<ReactionRow> for Reaction {
    fn from(row: ReactionRow) -> Self {
        let user_id = parse_id(&row.user_id, "reaction user_id");
        Reaction {
            id: parse_id(&row.id, "reaction id"),
            message_id: parse_id(&row.message_id, "reaction message_id"),
            user_id,
            emoji: row.emoji,
            user: ReactionUser {
                id: user_id,
                username: row.username,
            },
        }
    }
}

impl MessageRow {
    pub fn into_message(self, reactions: Vec<Reaction>) -> Message {
        let user_id = parse_id(&self.user_id, "author_id");
        let kind = MessageKind::parse(&self.kind).unwrap_or_else(|| {
            warn!("Unknown message kind '{}' on message '{}'", self.kind, self.id);
            MessageKind::Text
        });
        let attachment = self.file_url.map(|url| Attachment {
            url,
            name: self.file_name,
            size: self.file_size,
        });

        Message {
            id: parse_id(&self.id, "message id"),
            content: self.content,
            kind,
            attachment,
            user_id,
            user: PublicProfile {
                id: user_id,
                username: self.author_username,
                name: self.author_name,
            },
            reactions,
            timestamp: parse_timestamp(&self.created_at),
            is_edited: self.is_edited,
            edited_at: self.edited_at.as_deref().map(parse_timestamp),
            is_deleted: self.is_deleted,
        }
    }
}
