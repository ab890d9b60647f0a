use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attachment::FileAttachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// A single chat turn. The role is fixed at creation; only `content`
/// mutates (user edits, or streaming appends while a reply is in flight).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Which model produced an assistant message.
    pub model: Option<String>,
    /// Immutable once the message is sent. Not serialized: attachment
    /// payloads are local blob handles, not durable state.
    #[serde(skip)]
    pub attachments: Vec<FileAttachment>,
}

impl Message {
    pub fn user(content: impl Into<String>, attachments: Vec<FileAttachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            model: None,
            attachments,
        }
    }

    pub fn assistant(model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            model: Some(model.into()),
            attachments: Vec::new(),
        }
    }
}
