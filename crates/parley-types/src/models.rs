use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a user identity. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub disease: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub place_of_birth: Option<String>,
}

/// Kind tag carried by every chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Whether messages of this kind must reference uploaded media.
    pub fn is_media(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown message kind '{}'", other)),
        }
    }
}

/// One entry of the caller's chat list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub recipient_id: String,
    pub recipient_name: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageKind,
    pub media_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_wire_format() {
        assert_eq!(serde_json::to_string(&MessageKind::Image).unwrap(), "\"image\"");
        let kind: MessageKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(kind, MessageKind::Video);
        assert!(serde_json::from_str::<MessageKind>("\"audio\"").is_err());
    }

    #[test]
    fn message_kind_parses_stored_tags() {
        assert_eq!("text".parse::<MessageKind>().unwrap(), MessageKind::Text);
        assert!("TEXT".parse::<MessageKind>().is_err());
        assert!(!MessageKind::Text.is_media());
        assert!(MessageKind::Video.is_media());
    }
}
