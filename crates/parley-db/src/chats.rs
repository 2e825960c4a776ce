use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::unique_violation;
use crate::models::{ChatRow, ChatSummaryRow, UserRow, now_timestamp};
use crate::users::query_user_by_username;
use crate::{Database, DbError, Result};

/// One row per chat the viewer (`?1`) is in, joined with the other
/// participant and the chat's latest message.
const SUMMARY_SQL: &str = "
    SELECT c.id, u.id, u.name,
        (SELECT m.content FROM messages m WHERE m.chat_id = c.id
            ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
        (SELECT m.created_at FROM messages m WHERE m.chat_id = c.id
            ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
        EXISTS(SELECT 1 FROM messages m WHERE m.chat_id = c.id
            AND m.sender_id != ?1 AND m.read = 0)
    FROM chat_participants me
    JOIN chats c ON c.id = me.chat_id
    JOIN chat_participants other ON other.chat_id = c.id AND other.user_id != ?1
    JOIN users u ON u.id = other.user_id
    WHERE me.user_id = ?1";

/// Normalized key for an unordered user pair.
pub fn pair_key(a: i64, b: i64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", lo, hi)
}

impl Database {
    /// Chat summaries for `user_id`, in participant-row insertion order.
    pub fn list_chats_for(&self, user_id: i64) -> Result<Vec<ChatSummaryRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} ORDER BY me.id", SUMMARY_SQL);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], row_to_summary)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn chat_summary(&self, chat_id: &str, user_id: i64) -> Result<Option<ChatSummaryRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} AND c.id = ?2", SUMMARY_SQL);
            let row = conn
                .query_row(&sql, params![user_id, chat_id], row_to_summary)
                .optional()?;
            Ok(row)
        })
    }

    /// Returns the chat between `requester_id` and the user named
    /// `recipient_username`, creating it if the pair has none yet.
    ///
    /// The returned flag is `true` when this call created the chat. Creation
    /// inserts the chat and both participant rows in one transaction; if a
    /// concurrent writer wins the `pair_key` constraint, the winner's row is
    /// returned instead.
    pub fn create_or_get_chat(
        &self,
        requester_id: i64,
        recipient_username: &str,
    ) -> Result<(ChatRow, UserRow, bool)> {
        self.with_conn_mut(|conn| {
            let recipient = query_user_by_username(conn, recipient_username)?
                .ok_or(DbError::NotFound("recipient"))?;

            if recipient.id == requester_id {
                return Err(DbError::Invalid("cannot start a chat with yourself".into()));
            }

            let key = pair_key(requester_id, recipient.id);
            if let Some(existing) = query_chat_by_pair(conn, &key)? {
                debug!(chat_id = %existing.id, "Chat already exists for pair {}", key);
                return Ok((existing, recipient, false));
            }

            match insert_chat(conn, &key, requester_id, recipient.id) {
                Ok((chat, created)) => {
                    if created {
                        info!(chat_id = %chat.id, "Created chat for pair {}", key);
                    }
                    Ok((chat, recipient, created))
                }
                Err(DbError::Sqlite(e)) if unique_violation(&e).is_some() => {
                    debug!("Lost chat creation race for pair {}, re-reading", key);
                    let winner = query_chat_by_pair(conn, &key)?.ok_or(DbError::NotFound("chat"))?;
                    Ok((winner, recipient, false))
                }
                Err(e) => Err(e),
            }
        })
    }
}

/// Inserts chat + both participants under an immediate transaction. The pair
/// is re-checked once the write lock is held, so a writer that committed in
/// between is picked up rather than duplicated.
fn insert_chat(conn: &mut Connection, key: &str, a: i64, b: i64) -> Result<(ChatRow, bool)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(existing) = query_chat_by_pair(&tx, key)? {
        return Ok((existing, false));
    }

    let chat = ChatRow {
        id: Uuid::new_v4().to_string(),
        pair_key: key.to_string(),
        created_at: now_timestamp(),
    };
    tx.execute(
        "INSERT INTO chats (id, pair_key, created_at) VALUES (?1, ?2, ?3)",
        params![chat.id, chat.pair_key, chat.created_at],
    )?;
    for user_id in [a, b] {
        tx.execute(
            "INSERT INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
            params![chat.id, user_id],
        )?;
    }
    tx.commit()?;

    Ok((chat, true))
}

fn query_chat_by_pair(conn: &Connection, key: &str) -> Result<Option<ChatRow>> {
    let row = conn
        .query_row(
            "SELECT id, pair_key, created_at FROM chats WHERE pair_key = ?1",
            [key],
            |r| {
                Ok(ChatRow {
                    id: r.get(0)?,
                    pair_key: r.get(1)?,
                    created_at: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn is_participant(conn: &Connection, chat_id: &str, user_id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2)",
        params![chat_id, user_id],
        |r| r.get(0),
    )?)
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<ChatSummaryRow> {
    Ok(ChatSummaryRow {
        chat_id: row.get(0)?,
        recipient_id: row.get(1)?,
        recipient_name: row.get(2)?,
        last_message: row.get(3)?,
        last_message_at: row.get(4)?,
        unread: row.get(5)?,
    })
}
