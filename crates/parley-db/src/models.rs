//! Database row types. These map directly to SQLite rows and stay
//! independent of the wire models in parley-types.

use chrono::{NaiveDate, SecondsFormat, Utc};
use parley_types::models::MessageKind;

pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub disease: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub place_of_birth: Option<String>,
    pub created_at: String,
}

/// Fields for a user insert. The password is already hashed.
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub disease: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub place_of_birth: Option<String>,
}

/// Profile changes applied in one transaction. `None` leaves a column as is.
#[derive(Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub disease: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub place_of_birth: Option<String>,
}

pub struct ChatRow {
    pub id: String,
    pub pair_key: String,
    pub created_at: String,
}

/// A chat as seen by one of its participants.
pub struct ChatSummaryRow {
    pub chat_id: String,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<String>,
    pub unread: bool,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: i64,
    pub sender_name: String,
    pub content: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub created_at: String,
    pub read: bool,
}

pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: i64,
    pub content: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
}

pub struct ActivityRow {
    pub id: i64,
    pub action: String,
    pub user_id: i64,
    pub created_at: String,
}

/// RFC 3339 with fixed microsecond precision, so string order is time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
