use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use duo_types::models::Message;

use crate::{AppState, blocking};

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: only messages created strictly before this instant.
    pub before: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

/// Conversation history, oldest first. Deleted messages keep their slot but
/// lose their content.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let limit = query.limit.min(MAX_PAGE);
    let before = query.before;

    let messages = blocking(&state, move |db| db.list_messages(limit, before)).await?;
    Ok(Json(messages.into_iter().map(Message::redacted).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;
    use chrono::Duration;
    use duo_db::models::NewMessage;
    use duo_types::models::MessageKind;
    use uuid::Uuid;

    fn post(state: &AppState, author: Uuid, content: &str, at: DateTime<Utc>) -> Uuid {
        let msg = NewMessage {
            id: Uuid::new_v4(),
            user_id: author,
            content: content.to_string(),
            kind: MessageKind::Text,
            attachment: None,
        };
        state.db.insert_message(&msg).unwrap();
        // The store stamps the current time; pin it for cursor tests
        state
            .db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE messages SET created_at = ?1 WHERE id = ?2",
                    [duo_db::format_timestamp(at), msg.id.to_string()],
                )?;
                Ok(())
            })
            .unwrap();
        msg.id
    }

    fn query(limit: u32, before: Option<DateTime<Utc>>) -> Query<MessageQuery> {
        Query(MessageQuery { limit, before })
    }

    #[tokio::test]
    async fn lists_oldest_first_and_redacts_deleted() {
        let state = test_state();
        let alice = Uuid::new_v4();
        state.db.create_user(alice, "alice", "Alice").unwrap();
        let t0 = Utc::now() - Duration::minutes(10);
        post(&state, alice, "first", t0);
        let gone = post(&state, alice, "oops", t0 + Duration::minutes(1));
        post(&state, alice, "third", t0 + Duration::minutes(2));
        assert!(state.db.soft_delete_message(gone, alice).unwrap());

        let Json(messages) = list_messages(State(state.clone()), query(50, None)).await.unwrap();

        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "", "third"]);
        assert!(messages[1].is_deleted);
        assert_eq!(messages[0].user.username, "alice");
    }

    #[tokio::test]
    async fn before_cursor_pages_backwards() {
        let state = test_state();
        let alice = Uuid::new_v4();
        state.db.create_user(alice, "alice", "Alice").unwrap();
        let t0 = Utc::now() - Duration::minutes(10);
        for i in 0..5 {
            post(&state, alice, &format!("m{i}"), t0 + Duration::minutes(i));
        }

        let Json(page) = list_messages(State(state.clone()), query(2, Some(t0 + Duration::minutes(3))))
            .await
            .unwrap();

        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2"]);
    }

    #[test]
    fn limit_defaults_to_fifty() {
        let q: MessageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.limit, 50);
        assert!(q.before.is_none());
    }
}
