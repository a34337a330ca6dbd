use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            is_online   INTEGER NOT NULL DEFAULT 0,
            last_seen   TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            kind        TEXT NOT NULL DEFAULT 'TEXT',
            file_url    TEXT,
            file_name   TEXT,
            file_size   INTEGER,
            created_at  TEXT NOT NULL,
            is_edited   INTEGER NOT NULL DEFAULT 0,
            edited_at   TEXT,
            is_deleted  INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at);

        -- One reaction per user per message; a new emoji replaces the old one
        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS read_receipts (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            read_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
