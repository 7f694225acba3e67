//! Inbound chat message types.

use serde::{Deserialize, Serialize};

/// Where a message was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    Private,
    Group { title: Option<String> },
}

impl ChatKind {
    pub fn is_group(&self) -> bool {
        matches!(self, ChatKind::Group { .. })
    }

    /// Context line attached to the completion request.
    pub fn context(&self) -> String {
        match self {
            ChatKind::Private => "Private chat".to_string(),
            ChatKind::Group { title } => {
                format!("Group chat: {}", title.as_deref().unwrap_or("Unknown"))
            }
        }
    }

    /// Source label for response activity entries.
    pub fn activity_source(&self) -> String {
        match self {
            ChatKind::Private => "Private Chat".to_string(),
            ChatKind::Group { title } => title.clone().unwrap_or_else(|| "Group Chat".to_string()),
        }
    }
}

/// Author of the message being replied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    pub message_id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
}

/// A user added to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub user_id: i64,
    pub username: Option<String>,
}

/// A text message received from the transport. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub chat: ChatKind,
    /// Sender, absent for anonymous admins and channel posts.
    pub user_id: Option<i64>,
    pub text: String,
    pub reply_to: Option<ReplyTo>,
}

impl IncomingMessage {
    /// First 50 chars, for log lines.
    pub fn preview(&self) -> String {
        self.text.chars().take(50).collect()
    }
}
