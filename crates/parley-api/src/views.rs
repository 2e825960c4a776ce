//! Conversions from store rows to wire models.

use chrono::{DateTime, Utc};
use tracing::warn;

use parley_db::models::{ChatSummaryRow, MessageRow, UserRow};
use parley_types::models::{ChatSummary, Message, UserProfile};

pub fn profile_of(user: &UserRow) -> UserProfile {
    UserProfile {
        id: user.id,
        name: user.name.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role.clone(),
        disease: user.disease.clone(),
        date_of_birth: user.date_of_birth,
        place_of_birth: user.place_of_birth.clone(),
    }
}

pub fn chat_summary(row: ChatSummaryRow) -> ChatSummary {
    ChatSummary {
        last_message_time: row.last_message_at.as_deref().map(parse_timestamp),
        id: row.chat_id,
        recipient_id: row.recipient_id.to_string(),
        recipient_name: row.recipient_name,
        last_message: row.last_message,
        unread: row.unread,
    }
}

pub fn message(row: MessageRow) -> Message {
    Message {
        timestamp: parse_timestamp(&row.created_at),
        id: row.id,
        chat_id: row.chat_id,
        sender_id: row.sender_id.to_string(),
        sender_name: row.sender_name,
        content: row.content,
        message_type: row.kind,
        media_url: row.media_url,
        read: row.read,
    }
}

/// Stored timestamps are RFC 3339. A corrupt value is logged and replaced by
/// the epoch rather than failing the whole listing.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
