use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

// -- Users --

/// The other participant of the conversation, as shown in the chat header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResponse {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<User> for PeerResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            is_online: user.is_online,
            last_seen: user.last_seen,
        }
    }
}
