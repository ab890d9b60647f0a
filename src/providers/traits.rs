use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{
    ChatMessage, CompletionOptions, ExportFormat, ModelInfo, ProviderError, StreamEvent,
};
use crate::config;
use crate::models::{Message, ProviderId, Role};

const TITLE_PROMPT: &str = "Generate a short, concise title (max 6 words) for this \
conversation. Reply with only the title, no quotes or extra text.";

/// Capability interface for a hosted completion API. One variant exists
/// today (OpenRouter); the router keeps provider selection out of the
/// orchestrator. Text transforms and titling have default implementations
/// built on `create_completion`, so a variant only has to supply the
/// network calls.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    /// One-shot completion. Non-2xx fails with the HTTP status and the
    /// provider-supplied message; 401 maps to the authentication error.
    async fn create_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<String, ProviderError>;

    /// Streaming completion: text fragments are delivered through `tx` in
    /// arrival order, terminated by `StreamEvent::Done`. The returned error
    /// covers failures before any data arrived.
    async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError>;

    async fn list_models(&self) -> Vec<ModelInfo>;

    /// Best-effort auto-title over the first turns of a conversation.
    /// Never fails: any error falls back to the default title.
    async fn generate_title(&self, messages: Vec<ChatMessage>) -> String {
        let mut prompt = vec![ChatMessage {
            role: Role::System,
            content: TITLE_PROMPT.to_string(),
        }];
        prompt.extend(messages.into_iter().take(4));

        let options = CompletionOptions {
            max_tokens: Some(20),
            temperature: Some(0.7),
            ..Default::default()
        };

        match self.create_completion(prompt, options).await {
            Ok(title) => {
                let title = title.trim().trim_matches(|c| c == '"' || c == '\'').trim();
                if title.is_empty() {
                    config::DEFAULT_CONVERSATION_TITLE.to_string()
                } else {
                    title.to_string()
                }
            }
            Err(e) => {
                tracing::warn!("Title generation failed: {}", e);
                config::DEFAULT_CONVERSATION_TITLE.to_string()
            }
        }
    }

    async fn summarize_text(
        &self,
        text: &str,
        max_words: u32,
    ) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: format!(
                    "Summarize the following text in approximately {} words or less.",
                    max_words
                ),
            },
            ChatMessage {
                role: Role::User,
                content: text.to_string(),
            },
        ];
        let options = CompletionOptions {
            max_tokens: Some(max_words.saturating_mul(3) / 2),
            ..Default::default()
        };
        self.create_completion(messages, options).await
    }

    async fn translate_text(
        &self,
        text: &str,
        language: &str,
    ) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: format!(
                    "Translate the following text to {}. Provide only the translation.",
                    language
                ),
            },
            ChatMessage {
                role: Role::User,
                content: text.to_string(),
            },
        ];
        self.create_completion(messages, CompletionOptions::default()).await
    }

    /// Serialize a transcript. System messages never appear in the
    /// Markdown/plain-text renderings.
    fn export_transcript(&self, messages: &[Message], format: ExportFormat) -> String {
        match format {
            ExportFormat::Json => {
                serde_json::to_string_pretty(messages).unwrap_or_else(|_| "[]".to_string())
            }
            ExportFormat::Markdown => {
                let mut out = String::from("# Conversation Export\n\n");
                for msg in messages.iter().filter(|m| m.role != Role::System) {
                    let label = match msg.role {
                        Role::User => "**You**",
                        _ => "**Assistant**",
                    };
                    out.push_str(&format!(
                        "### {} - {}\n\n{}\n\n---\n\n",
                        label,
                        msg.created_at.format("%Y-%m-%d %H:%M:%S"),
                        msg.content
                    ));
                }
                out
            }
            ExportFormat::Txt => {
                let mut out = format!("Conversation Export\n{}\n\n", "=".repeat(50));
                for msg in messages.iter().filter(|m| m.role != Role::System) {
                    let label = match msg.role {
                        Role::User => "You",
                        _ => "Assistant",
                    };
                    out.push_str(&format!(
                        "[{}] - {}\n{}\n\n{}\n\n",
                        label,
                        msg.created_at.format("%Y-%m-%d %H:%M:%S"),
                        msg.content,
                        "-".repeat(50)
                    ));
                }
                out
            }
        }
    }

    /// Case-insensitive substring search over message content.
    fn search_messages<'a>(&self, messages: &'a [Message], query: &str) -> Vec<&'a Message> {
        let query = query.to_lowercase();
        messages
            .iter()
            .filter(|m| m.content.to_lowercase().contains(&query))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    struct StubProvider {
        reply: &'static str,
    }

    #[async_trait]
    impl ChatProvider for StubProvider {
        fn provider_id(&self) -> ProviderId {
            ProviderId::OpenRouter
        }

        async fn create_completion(
            &self,
            _messages: Vec<ChatMessage>,
            _options: CompletionOptions,
        ) -> Result<String, ProviderError> {
            if self.reply.is_empty() {
                Err(ProviderError::Network("offline".to_string()))
            } else {
                Ok(self.reply.to_string())
            }
        }

        async fn stream_completion(
            &self,
            _messages: Vec<ChatMessage>,
            _options: CompletionOptions,
            _tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn list_models(&self) -> Vec<ModelInfo> {
            Vec::new()
        }
    }

    fn sample_messages() -> Vec<Message> {
        let system = Message {
            id: "sys".to_string(),
            role: Role::System,
            content: "hidden".to_string(),
            created_at: chrono::Utc::now(),
            model: None,
            attachments: Vec::new(),
        };
        let user = Message::user("What is Rust?", Vec::new());
        let mut reply = Message::assistant("test-model");
        reply.content = "A systems programming language.".to_string();
        vec![system, user, reply]
    }

    #[tokio::test]
    async fn test_generate_title_strips_quotes() {
        let provider = StubProvider { reply: "\"Rust Basics\"" };
        let title = provider.generate_title(Vec::new()).await;
        assert_eq!(title, "Rust Basics");
    }

    #[tokio::test]
    async fn test_generate_title_falls_back_on_error() {
        let provider = StubProvider { reply: "" };
        let title = provider.generate_title(Vec::new()).await;
        assert_eq!(title, "New Conversation");
    }

    #[test]
    fn test_export_markdown_excludes_system() {
        let provider = StubProvider { reply: "x" };
        let md = provider.export_transcript(&sample_messages(), ExportFormat::Markdown);
        assert!(md.starts_with("# Conversation Export"));
        assert!(md.contains("**You**"));
        assert!(md.contains("What is Rust?"));
        assert!(!md.contains("hidden"));
    }

    #[test]
    fn test_export_txt_excludes_system() {
        let provider = StubProvider { reply: "x" };
        let txt = provider.export_transcript(&sample_messages(), ExportFormat::Txt);
        assert!(txt.contains("[You]"));
        assert!(txt.contains("[Assistant]"));
        assert!(!txt.contains("hidden"));
    }

    #[test]
    fn test_export_json_round_trips() {
        let provider = StubProvider { reply: "x" };
        let json = provider.export_transcript(&sample_messages(), ExportFormat::Json);
        let parsed: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].content, "What is Rust?");
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let provider = StubProvider { reply: "x" };
        let messages = sample_messages();
        let hits = provider.search_messages(&messages, "RUST");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "What is Rust?");

        assert!(provider.search_messages(&messages, "python").is_empty());
    }
}
