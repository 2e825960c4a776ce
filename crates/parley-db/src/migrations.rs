use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                role            TEXT NOT NULL,
                disease         TEXT,
                date_of_birth   TEXT,
                place_of_birth  TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- pair_key is min_user_id:max_user_id, one chat per unordered pair
            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                pair_key    TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE chat_participants (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                UNIQUE(chat_id, user_id)
            );

            CREATE INDEX idx_participants_user
                ON chat_participants(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                chat_id         TEXT NOT NULL REFERENCES chats(id),
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                message_type    TEXT NOT NULL DEFAULT 'text',
                media_url       TEXT,
                created_at      TEXT NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_chat
                ON messages(chat_id, created_at);

            CREATE TABLE activity_logs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                action      TEXT NOT NULL,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_activity_user
                ON activity_logs(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
