use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use duo_types::models::{Message, Reaction, ReadReceipt, User};

use crate::models::{parse_id, MessageRow, NewMessage, ReactionRow, UserRow};
use crate::{format_timestamp, parse_timestamp, Database};

const MESSAGE_COLUMNS: &str = "m.id, m.user_id, u.username, u.name, m.content, m.kind, m.file_url, \
     m.file_name, m.file_size, m.created_at, m.is_edited, m.edited_at, m.is_deleted";

const USER_COLUMNS: &str = "id, username, name, is_online, last_seen, created_at";

impl Database {
    // -- Users --

    /// Registration lives outside the real-time core; this is the store half of it.
    pub fn create_user(&self, id: Uuid, username: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, name) VALUES (?1, ?2, ?3)",
                (id.to_string(), username, name),
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            let row = conn
                .query_row(&sql, [id.to_string()], map_user_row)
                .optional()?;
            Ok(row.map(User::from))
        })
    }

    /// The earliest-registered user that is not `user_id`.
    pub fn find_peer(&self, user_id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY created_at, rowid LIMIT 1"
            );
            let row = conn
                .query_row(&sql, [user_id.to_string()], map_user_row)
                .optional()?;
            Ok(row.map(User::from))
        })
    }

    /// Stamp presence columns. Returns false when the user does not exist.
    pub fn set_presence(&self, user_id: Uuid, online: bool, seen_at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_online = ?1, last_seen = ?2 WHERE id = ?3",
                rusqlite::params![online, format_timestamp(seen_at), user_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    /// Insert a message stamped with the current time. The stamp is taken
    /// under the connection lock, so creation times follow insert order.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<DateTime<Utc>> {
        let (file_url, file_name, file_size) = match &msg.attachment {
            Some(a) => (Some(a.url.clone()), a.name.clone(), a.size),
            None => (None, None, None),
        };

        self.with_conn(|conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO messages (id, user_id, content, kind, file_url, file_name, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id.to_string(),
                    msg.user_id.to_string(),
                    msg.content,
                    msg.kind.as_str(),
                    file_url,
                    file_name,
                    file_size,
                    format_timestamp(created_at),
                ],
            )?;
            Ok(created_at)
        })
    }

    /// Load one message with its author profile and reactions.
    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 WHERE m.id = ?1"
            );
            let Some(row) = conn
                .query_row(&sql, [id.to_string()], map_message_row)
                .optional()?
            else {
                return Ok(None);
            };

            let reactions = query_reactions(conn, &[row.id.clone()])?
                .into_iter()
                .map(Reaction::from)
                .collect();
            Ok(Some(row.into_message(reactions)))
        })
    }

    /// Latest `limit` messages (optionally strictly older than `before`),
    /// returned oldest first.
    pub fn list_messages(&self, limit: u32, before: Option<DateTime<Utc>>) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let cursor = before.map(format_timestamp);
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON m.user_id = u.id
                 WHERE (?1 IS NULL OR m.created_at < ?1)
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![cursor, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();

            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut by_message: HashMap<String, Vec<Reaction>> = HashMap::new();
            for r in query_reactions(conn, &ids)? {
                by_message.entry(r.message_id.clone()).or_default().push(r.into());
            }

            Ok(rows
                .into_iter()
                .map(|row| {
                    let reactions = by_message.remove(&row.id).unwrap_or_default();
                    row.into_message(reactions)
                })
                .collect())
        })
    }

    /// Replace the content of a message, but only if `author_id` wrote it.
    /// Returns false when no row matched.
    pub fn update_message_content(
        &self,
        id: Uuid,
        author_id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2
                 WHERE id = ?3 AND user_id = ?4",
                rusqlite::params![
                    content,
                    format_timestamp(edited_at),
                    id.to_string(),
                    author_id.to_string()
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Flag a message deleted. Content stays in the row.
    pub fn soft_delete_message(&self, id: Uuid, author_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1 WHERE id = ?1 AND user_id = ?2",
                (id.to_string(), author_id.to_string()),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Reactions --

    /// Insert the user's reaction, or swap the emoji on the one they already
    /// have. A single statement, so concurrent calls can never leave two rows.
    pub fn upsert_reaction(&self, id: Uuid, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(message_id, user_id) DO UPDATE SET emoji = excluded.emoji",
                rusqlite::params![
                    id.to_string(),
                    message_id.to_string(),
                    user_id.to_string(),
                    emoji,
                    format_timestamp(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_reactions(&self, message_id: Uuid) -> Result<Vec<Reaction>> {
        self.with_conn(|conn| {
            Ok(query_reactions(conn, &[message_id.to_string()])?
                .into_iter()
                .map(Reaction::from)
                .collect())
        })
    }

    // -- Read receipts --

    /// Record that `user_id` read `message_id`. Returns true only for the
    /// call that actually created the receipt.
    pub fn insert_read_receipt(&self, message_id: Uuid, user_id: Uuid, read_at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO read_receipts (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    message_id.to_string(),
                    user_id.to_string(),
                    format_timestamp(read_at)
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_read_receipts(&self, message_id: Uuid) -> Result<Vec<ReadReceipt>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, user_id, read_at FROM read_receipts
                 WHERE message_id = ?1 ORDER BY read_at",
            )?;
            let rows = stmt
                .query_map([message_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .map(|(mid, uid, at)| ReadReceipt {
                    message_id: parse_id(&mid, "receipt message_id"),
                    user_id: parse_id(&uid, "receipt user_id"),
                    read_at: parse_timestamp(&at),
                })
                .collect())
        })
    }
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        is_online: row.get(3)?,
        last_seen: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_username: row.get(2)?,
        author_name: row.get(3)?,
        content: row.get(4)?,
        kind: row.get(5)?,
        file_url: row.get(6)?,
        file_name: row.get(7)?,
        file_size: row.get(8)?,
        created_at: row.get(9)?,
        is_edited: row.get(10)?,
        edited_at: row.get(11)?,
        is_deleted: row.get(12)?,
    })
}

/// Batch-fetch reactions (with the reacting user's name) for a set of message IDs.
fn query_reactions(conn: &Connection, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT r.id, r.message_id, r.user_id, u.username, r.emoji
         FROM reactions r
         JOIN users u ON r.user_id = u.id
         WHERE r.message_id IN ({})
         ORDER BY r.created_at, r.rowid",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(ReactionRow {
                id: row.get(0)?,
                message_id: row.get(1)?,
                user_id: row.get(2)?,
                username: row.get(3)?,
                emoji: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
