use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{ConversationSettings, FileAttachment, Message, ProviderId, Role};
use crate::providers::types::{ChatMessage, CompletionOptions, StreamEvent};
use crate::providers::ProviderRouter;

use super::store::{ConversationStore, SettingsUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    Streaming,
}

/// Executes one user turn at a time against the active conversation:
/// persist the user message, stream the assistant reply into the store,
/// finalize. Failures land in `last_error` and the session returns to
/// idle; nothing here is fatal and every path is retryable.
pub struct ChatSession {
    store: ConversationStore,
    router: Arc<ProviderRouter>,
    provider: ProviderId,
    state: ChatState,
    last_error: Option<String>,
}

impl ChatSession {
    pub fn new(store: ConversationStore, router: Arc<ProviderRouter>) -> Self {
        Self {
            store,
            router,
            provider: ProviderId::OpenRouter,
            state: ChatState::Idle,
            last_error: None,
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    /// Send a user message on the current conversation and stream the
    /// reply. Each delta is applied to the store (so observers always see
    /// the latest partial reply) and forwarded to `on_delta`.
    ///
    /// With no current conversation, one is created and the call is
    /// otherwise a no-op; the caller retries. A call while a turn is in
    /// flight is rejected, not queued.
    pub async fn send<F>(&mut self, content: &str, attachments: Vec<FileAttachment>, mut on_delta: F)
    where
        F: FnMut(&str),
    {
        if self.state != ChatState::Idle {
            tracing::warn!("Send rejected: another request is in flight");
            return;
        }
        let Some(conv) = self.store.current() else {
            self.store.create(None);
            return;
        };
        let conv_id = conv.id.clone();
        let settings = conv.settings.clone();

        self.state = ChatState::Sending;
        self.last_error = None;

        // The user's turn is durable before the network is touched.
        self.store
            .append_message(&conv_id, Message::user(content, attachments));

        let (context, prior_len) = match self.store.get(&conv_id) {
            Some(conv) => (build_context(&settings, &conv.messages), conv.messages.len()),
            None => {
                self.state = ChatState::Idle;
                return;
            }
        };

        let options = CompletionOptions {
            model: Some(settings.model.clone()),
            temperature: Some(settings.temperature),
            max_tokens: Some(settings.max_tokens),
            ..Default::default()
        };

        let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
        let router = self.router.clone();
        let provider = self.provider;
        tokio::spawn(async move {
            if let Err(e) = router
                .stream_completion(&provider, context, options, tx.clone())
                .await
            {
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            }
        });

        // One reply per turn: a single accumulating message, published on
        // every delta. It enters history with the first fragment.
        let mut reply = Message::assistant(settings.model.clone());
        let mut stream_error: Option<String> = None;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token(token) => {
                    self.state = ChatState::Streaming;
                    reply.content.push_str(&token);
                    self.store.update_reply(&conv_id, &reply);
                    on_delta(&token);
                }
                StreamEvent::Done => break,
                StreamEvent::Error(message) => {
                    stream_error = Some(message);
                    break;
                }
            }
        }

        if let Some(message) = stream_error {
            // Whatever partial reply arrived stays in history as-is.
            tracing::error!("Send failed: {}", message);
            self.last_error = Some(message);
            self.state = ChatState::Idle;
            return;
        }

        if prior_len == 1 {
            self.auto_title(&conv_id).await;
        }

        self.state = ChatState::Idle;
    }

    /// First exchange finished: ask the provider for a title. Titling is
    /// best-effort and never fails the send.
    async fn auto_title(&mut self, conv_id: &str) {
        let turns: Vec<ChatMessage> = match self.store.get(conv_id) {
            Some(conv) => conv.messages.iter().take(2).map(ChatMessage::from).collect(),
            None => return,
        };
        match self.router.generate_title(&self.provider, turns).await {
            Ok(title) => self.store.rename(conv_id, &title),
            Err(e) => tracing::warn!("Title generation unavailable: {}", e),
        }
    }

    /// Drop the last assistant reply and replay the user turn that
    /// produced it. Valid only when the history ends `[…, user,
    /// assistant]`; anything else is a silent no-op.
    pub async fn regenerate<F>(&mut self, on_delta: F)
    where
        F: FnMut(&str),
    {
        if self.state != ChatState::Idle {
            return;
        }
        let Some(conv) = self.store.current() else { return };
        let n = conv.messages.len();
        if n < 2
            || conv.messages[n - 1].role != Role::Assistant
            || conv.messages[n - 2].role != Role::User
        {
            return;
        }
        let conv_id = conv.id.clone();

        self.store.pop_last_message(&conv_id);
        // send() re-appends the user turn with its original content and
        // attachments, so pop it too rather than duplicating it.
        let Some(user) = self.store.pop_last_message(&conv_id) else {
            return;
        };
        self.send(&user.content, user.attachments, on_delta).await;
    }

    /// Replace a message's content and drop everything after it. The edit
    /// does not re-trigger a send; that is a separate user action.
    pub fn edit_message(&mut self, message_id: &str, new_content: &str) {
        let Some(conv_id) = self.store.current_id().map(str::to_string) else {
            return;
        };
        self.store.edit_message(&conv_id, message_id, new_content);
    }

    /// Remove exactly one message; downstream messages stay.
    pub fn delete_message(&mut self, message_id: &str) {
        let Some(conv_id) = self.store.current_id().map(str::to_string) else {
            return;
        };
        self.store.remove_message(&conv_id, message_id);
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) {
        let Some(conv_id) = self.store.current_id().map(str::to_string) else {
            return;
        };
        self.store.update_settings(&conv_id, update);
    }

    pub fn search(&self, query: &str) -> Vec<Message> {
        let Some(conv) = self.store.current() else {
            return Vec::new();
        };
        self.router
            .search_messages(&self.provider, &conv.messages, query)
            .map(|hits| hits.into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Summarize the whole transcript and append the summary as an
    /// assistant note.
    pub async fn summarize(&mut self) {
        if self.state != ChatState::Idle {
            return;
        }
        let Some(conv) = self.store.current() else { return };
        if conv.messages.is_empty() {
            return;
        }
        let conv_id = conv.id.clone();
        let transcript = conv
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        match self
            .router
            .summarize_text(&self.provider, &transcript, 300)
            .await
        {
            Ok(summary) => {
                let note = assistant_note(format!("**Conversation Summary:**\n\n{}", summary));
                self.store.append_message(&conv_id, note);
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Translate one message and append the translation as an assistant
    /// note. Unknown ids are a silent no-op.
    pub async fn translate_message(&mut self, message_id: &str, language: &str) {
        if self.state != ChatState::Idle {
            return;
        }
        let Some(conv) = self.store.current() else { return };
        let Some(message) = conv.messages.iter().find(|m| m.id == message_id) else {
            return;
        };
        let conv_id = conv.id.clone();
        let content = message.content.clone();

        match self
            .router
            .translate_text(&self.provider, &content, language)
            .await
        {
            Ok(translation) => {
                let note = assistant_note(format!(
                    "**Translation to {}:**\n\n{}",
                    language, translation
                ));
                self.store.append_message(&conv_id, note);
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
            }
        }
    }
}

/// Assemble the request context: the system prompt (when set) as a
/// synthetic first message (never stored in history) followed by the
/// full history.
fn build_context(settings: &ConversationSettings, messages: &[Message]) -> Vec<ChatMessage> {
    let mut context = Vec::with_capacity(messages.len() + 1);
    if !settings.system_prompt.is_empty() {
        context.push(ChatMessage {
            role: Role::System,
            content: settings.system_prompt.clone(),
        });
    }
    context.extend(messages.iter().map(ChatMessage::from));
    context
}

fn assistant_note(content: String) -> Message {
    Message {
        id: Uuid::new_v4().to_string(),
        role: Role::Assistant,
        content,
        created_at: Utc::now(),
        model: None,
        attachments: Vec::new(),
    }
}
