use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::config;

use super::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenRouter,
}

/// Stored provider tags from older builds may name providers that no
/// longer exist; they normalize to the supported one instead of failing
/// the whole payload.
impl<'de> Deserialize<'de> for ProviderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(ProviderId::from_str(&tag).unwrap_or(ProviderId::OpenRouter))
    }
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenRouter => "openrouter",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenRouter => "OpenRouter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "openrouter" => Some(ProviderId::OpenRouter),
            _ => None,
        }
    }
}

/// Per-conversation generation settings. The system prompt is prepended to
/// every request as a synthetic system message and never stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSettings {
    pub provider: ProviderId,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: String,
    /// Settings schema version; payloads written before versioning
    /// deserialize as 0 and get migrated on load.
    #[serde(default)]
    pub version: u32,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            provider: ProviderId::OpenRouter,
            model: config::DEFAULT_MODEL.to_string(),
            temperature: config::DEFAULT_TEMPERATURE,
            max_tokens: config::DEFAULT_MAX_TOKENS,
            system_prompt: config::DEFAULT_SYSTEM_PROMPT.to_string(),
            version: config::SETTINGS_VERSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settings: ConversationSettings,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub folder: Option<String>,
}

impl Conversation {
    pub fn new(title: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.unwrap_or(config::DEFAULT_CONVERSATION_TITLE).to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            settings: ConversationSettings::default(),
            pinned: false,
            folder: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_defaults() {
        let conv = Conversation::new(None);
        assert_eq!(conv.title, "New Conversation");
        assert!(conv.messages.is_empty());
        assert!(!conv.pinned);
        assert_eq!(conv.settings.provider, ProviderId::OpenRouter);
        assert_eq!(conv.settings.model, config::DEFAULT_MODEL);
    }

    #[test]
    fn test_unknown_provider_tag_normalizes() {
        let provider: ProviderId = serde_json::from_str("\"groq\"").unwrap();
        assert_eq!(provider, ProviderId::OpenRouter);
    }

    #[test]
    fn test_settings_version_defaults_to_zero_on_old_payloads() {
        // A payload written before the version field existed.
        let json = r#"{
            "provider": "openrouter",
            "model": "some/old-model",
            "temperature": 1.0,
            "max_tokens": 1024
        }"#;
        let settings: ConversationSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.version, 0);
        assert!(settings.system_prompt.is_empty());
    }
}
