use rusqlite::types::Type;
use rusqlite::{Connection, Row, TransactionBehavior, params};
use tracing::debug;
use uuid::Uuid;

use crate::chats::is_participant;
use crate::models::{MessageRow, NewMessage, now_timestamp};
use crate::{Database, DbError, Result};

const MESSAGE_SELECT: &str = "
    SELECT m.id, m.chat_id, m.sender_id, u.name, m.content, m.message_type,
           m.media_url, m.created_at, m.read
    FROM messages m
    LEFT JOIN users u ON m.sender_id = u.id";

impl Database {
    /// Appends a message to a chat. The sender must be a participant.
    pub fn insert_message(&self, message: &NewMessage) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !is_participant(&tx, &message.chat_id, message.sender_id)? {
                return Err(DbError::NotAParticipant);
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, message_type, media_url, created_at, read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                params![
                    id,
                    message.chat_id,
                    message.sender_id,
                    message.content,
                    message.kind.as_str(),
                    message.media_url,
                    now_timestamp(),
                ],
            )?;

            let row = query_message(&tx, &id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Returns every message of `chat_id` oldest first and, in the same
    /// transaction, marks as read each message not sent by `reader_id`.
    ///
    /// The read flag only ever moves from false to true, so repeating the
    /// call changes nothing further. Returned rows carry the updated flags.
    pub fn fetch_and_mark_read(&self, chat_id: &str, reader_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !is_participant(&tx, chat_id, reader_id)? {
                return Err(DbError::NotAParticipant);
            }

            let marked = tx.execute(
                "UPDATE messages SET read = 1 WHERE chat_id = ?1 AND sender_id != ?2 AND read = 0",
                params![chat_id, reader_id],
            )?;
            if marked > 0 {
                debug!(chat_id, reader_id, "Marked {} messages as read", marked);
            }

            let rows = {
                let sql = format!(
                    "{} WHERE m.chat_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC",
                    MESSAGE_SELECT
                );
                let mut stmt = tx.prepare(&sql)?;
                stmt.query_map([chat_id], row_to_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            tx.commit()?;
            Ok(rows)
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<MessageRow> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
    Ok(conn.query_row(&sql, [id], row_to_message)?)
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let kind: String = row.get(5)?;
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        kind: kind
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?,
        media_url: row.get(6)?,
        created_at: row.get(7)?,
        read: row.get(8)?,
    })
}

#[cfg(test)]
pub(crate) fn text_message(chat_id: &str, sender_id: i64, content: &str) -> NewMessage {
    NewMessage {
        chat_id: chat_id.to_string(),
        sender_id,
        content: content.to_string(),
        kind: parley_types::models::MessageKind::Text,
        media_url: None,
    }
}
