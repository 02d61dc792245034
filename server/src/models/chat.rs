use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat message; never deleted
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn kind(&self) -> ContentKind {
        if self.content.starts_with("[image]") {
            ContentKind::Image
        } else if self.content.starts_with("[video]") {
            ContentKind::Video
        } else {
            ContentKind::Text
        }
    }

    /// Short text for conversation lists; media payloads are not echoed.
    pub fn preview(&self) -> String {
        match self.kind() {
            ContentKind::Image => "[image]".to_string(),
            ContentKind::Video => "[video]".to_string(),
            ContentKind::Text => self.content.chars().take(80).collect(),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
}

/// Conversation summary for the message list
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub room_id: String,
    pub counterpart_id: Option<Uuid>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: usize,
}

/// Client frames on the real-time channel
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Join {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Message {
        #[serde(rename = "roomId")]
        room_id: String,
        content: String,
    },
}

/// Server frames on the real-time channel
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Joined {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Message(ChatMessage),
    Error { message: String },
}
