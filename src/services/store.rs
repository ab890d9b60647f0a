use std::sync::Arc;

use thiserror::Error;

use crate::config;
use crate::models::{Conversation, ConversationSettings, Message, ProviderId};
use crate::providers::types::ExportFormat;
use crate::providers::ProviderRouter;

use super::storage::Storage;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid import payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unrecognized import shape: {0}")]
    Shape(String),
}

/// Patchable subset of conversation settings. Provider and model are not
/// here: they stay normalized to the supported values.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

/// Single source of truth for conversations and the active selection,
/// durable across restarts. All mutation goes through these operations;
/// each one writes the full list back to storage. Storage write failures
/// are logged and never surface; every operation leaves the in-memory
/// state consistent regardless.
pub struct ConversationStore {
    storage: Arc<dyn Storage>,
    router: Arc<ProviderRouter>,
    conversations: Vec<Conversation>,
    current_id: Option<String>,
}

impl ConversationStore {
    /// Restore from storage: tolerate absent or corrupt payloads, migrate
    /// stale settings in place, and re-select the previous conversation if
    /// it still exists.
    pub fn load(storage: Arc<dyn Storage>, router: Arc<ProviderRouter>) -> Self {
        let mut conversations: Vec<Conversation> = match storage.get(config::KEY_CONVERSATIONS) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::error!("Discarding corrupt conversation payload: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("Failed to read conversations from storage: {}", e);
                Vec::new()
            }
        };

        let mut migrated = false;
        for conv in &mut conversations {
            if migrate_settings(&mut conv.settings) {
                tracing::info!("Migrated settings for conversation \"{}\"", conv.title);
                migrated = true;
            }
        }

        let current_id = storage
            .get(config::KEY_LAST_CONVERSATION)
            .ok()
            .flatten()
            .filter(|id| conversations.iter().any(|c| c.id == *id));

        let store = Self {
            storage,
            router,
            conversations,
            current_id,
        };
        if migrated {
            store.persist();
        }
        store
    }

    // --- Accessors ---

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn current(&self) -> Option<&Conversation> {
        let id = self.current_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    // --- Conversation lifecycle ---

    pub fn create(&mut self, title: Option<&str>) -> &Conversation {
        let conv = Conversation::new(title);
        self.current_id = Some(conv.id.clone());
        self.conversations.insert(0, conv);
        self.persist();
        self.persist_selection();
        &self.conversations[0]
    }

    /// Select by id; silently ignores unknown ids.
    pub fn select(&mut self, id: &str) {
        if self.conversations.iter().any(|c| c.id == id) {
            self.current_id = Some(id.to_string());
            self.persist_selection();
        }
    }

    /// Delete by id. If the deleted conversation was current, the selection
    /// becomes empty, not reassigned.
    pub fn delete(&mut self, id: &str) {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return;
        }
        if self.current_id.as_deref() == Some(id) {
            self.current_id = None;
            self.persist_selection();
        }
        self.persist();
    }

    pub fn rename(&mut self, id: &str, title: &str) {
        if let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) {
            conv.title = title.to_string();
            conv.updated_at = chrono::Utc::now();
            self.persist();
        }
    }

    /// Clone a conversation under a fresh identity. The copy is prepended
    /// but does not become current.
    pub fn duplicate(&mut self, id: &str) {
        let Some(conv) = self.get(id) else { return };
        let now = chrono::Utc::now();
        let mut copy = conv.clone();
        copy.id = uuid::Uuid::new_v4().to_string();
        copy.title = format!("{} (Copy)", conv.title);
        copy.created_at = now;
        copy.updated_at = now;
        self.conversations.insert(0, copy);
        self.persist();
    }

    pub fn toggle_pin(&mut self, id: &str) {
        if let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) {
            conv.pinned = !conv.pinned;
            self.persist();
        }
    }

    pub fn set_folder(&mut self, id: &str, folder: Option<String>) {
        if let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) {
            conv.folder = folder;
            self.persist();
        }
    }

    pub fn update_settings(&mut self, id: &str, update: SettingsUpdate) {
        if let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) {
            if let Some(temperature) = update.temperature {
                conv.settings.temperature = temperature;
            }
            if let Some(max_tokens) = update.max_tokens {
                conv.settings.max_tokens = max_tokens;
            }
            if let Some(system_prompt) = update.system_prompt {
                conv.settings.system_prompt = system_prompt;
            }
            conv.updated_at = chrono::Utc::now();
            self.persist();
        }
    }

    /// Drop everything: list, selection, and both durable keys.
    pub fn clear_all(&mut self) {
        self.conversations.clear();
        self.current_id = None;
        if let Err(e) = self.storage.remove(config::KEY_CONVERSATIONS) {
            tracing::error!("Failed to clear conversations from storage: {}", e);
        }
        if let Err(e) = self.storage.remove(config::KEY_LAST_CONVERSATION) {
            tracing::error!("Failed to clear selection from storage: {}", e);
        }
    }

    // --- Message mutation ---

    pub fn append_message(&mut self, id: &str, message: Message) {
        if let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) {
            conv.messages.push(message);
            conv.updated_at = chrono::Utc::now();
            self.persist();
        }
    }

    /// Publish the in-flight assistant reply: replaces the last message
    /// when it carries the same id, appends it otherwise. One reply per
    /// turn, never duplicated.
    pub fn update_reply(&mut self, id: &str, reply: &Message) {
        if let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) {
            match conv.messages.last_mut() {
                Some(last) if last.id == reply.id => *last = reply.clone(),
                _ => conv.messages.push(reply.clone()),
            }
            conv.updated_at = chrono::Utc::now();
            self.persist();
        }
    }

    /// Replace a message's content and truncate everything after it:
    /// edited turns invalidate downstream replies. Returns false if the
    /// message was not found.
    pub fn edit_message(&mut self, id: &str, message_id: &str, new_content: &str) -> bool {
        let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        let Some(index) = conv.messages.iter().position(|m| m.id == message_id) else {
            return false;
        };
        conv.messages[index].content = new_content.to_string();
        conv.messages.truncate(index + 1);
        conv.updated_at = chrono::Utc::now();
        self.persist();
        true
    }

    /// Remove exactly one message, leaving the rest (downstream included)
    /// intact.
    pub fn remove_message(&mut self, id: &str, message_id: &str) -> bool {
        let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        let before = conv.messages.len();
        conv.messages.retain(|m| m.id != message_id);
        if conv.messages.len() == before {
            return false;
        }
        conv.updated_at = chrono::Utc::now();
        self.persist();
        true
    }

    pub fn pop_last_message(&mut self, id: &str) -> Option<Message> {
        let conv = self.conversations.iter_mut().find(|c| c.id == id)?;
        let message = conv.messages.pop()?;
        conv.updated_at = chrono::Utc::now();
        self.persist();
        Some(message)
    }

    // --- Export / import ---

    /// Serialize a conversation's transcript via the provider's exporter.
    /// No mutation; None if the id is unknown.
    pub fn export_as_text(&self, id: &str, format: ExportFormat) -> Option<String> {
        let conv = self.get(id)?;
        match self
            .router
            .export_transcript(&conv.settings.provider, &conv.messages, format)
        {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!("Export failed: {}", e);
                None
            }
        }
    }

    /// Accepts the shapes `export_as_text` produces: a bare message array
    /// (wrapped into a fresh conversation) or a full conversation object
    /// (re-keyed). Malformed input leaves the store untouched.
    pub fn import_from_text(&mut self, data: &str) -> Result<String, ImportError> {
        let value: serde_json::Value = serde_json::from_str(data)?;

        let conv = if value.is_array() {
            let messages: Vec<Message> = serde_json::from_value(value)?;
            let mut conv = Conversation::new(Some("Imported Conversation"));
            conv.messages = messages;
            conv
        } else if value.get("messages").is_some() {
            let mut conv: Conversation = serde_json::from_value(value)?;
            let now = chrono::Utc::now();
            conv.id = uuid::Uuid::new_v4().to_string();
            conv.created_at = now;
            conv.updated_at = now;
            migrate_settings(&mut conv.settings);
            conv
        } else {
            return Err(ImportError::Shape(
                "expected a message array or a conversation object".to_string(),
            ));
        };

        let id = conv.id.clone();
        self.conversations.insert(0, conv);
        self.current_id = Some(id.clone());
        self.persist();
        self.persist_selection();
        Ok(id)
    }

    // --- Persistence ---

    fn persist(&self) {
        match serde_json::to_string(&self.conversations) {
            Ok(json) => {
                if let Err(e) = self.storage.set(config::KEY_CONVERSATIONS, &json) {
                    tracing::error!("Failed to persist conversations: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize conversations: {}", e),
        }
    }

    fn persist_selection(&self) {
        let result = match &self.current_id {
            Some(id) => self.storage.set(config::KEY_LAST_CONVERSATION, id),
            None => self.storage.remove(config::KEY_LAST_CONVERSATION),
        };
        if let Err(e) = result {
            tracing::error!("Failed to persist selection: {}", e);
        }
    }
}

/// Normalize stale settings onto current defaults. Provider and model are
/// forced to the supported values; the system prompt is refreshed only when
/// the stored schema version is older and the prompt is empty. Idempotent,
/// and never touches message history.
fn migrate_settings(settings: &mut ConversationSettings) -> bool {
    let mut changed = false;

    if settings.provider != ProviderId::OpenRouter {
        settings.provider = ProviderId::OpenRouter;
        changed = true;
    }
    if settings.model != config::DEFAULT_MODEL {
        settings.model = config::DEFAULT_MODEL.to_string();
        changed = true;
    }
    if settings.version < config::SETTINGS_VERSION {
        if settings.system_prompt.is_empty() {
            settings.system_prompt = config::DEFAULT_SYSTEM_PROMPT.to_string();
        }
        settings.version = config::SETTINGS_VERSION;
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryStorage;

    fn new_store() -> ConversationStore {
        let storage = Arc::new(MemoryStorage::new());
        ConversationStore::load(storage, Arc::new(test_router()))
    }

    fn test_router() -> ProviderRouter {
        use crate::providers::types::{
            ChatMessage, CompletionOptions, ModelInfo, StreamEvent,
        };
        use crate::providers::ChatProvider;
        use async_trait::async_trait;
        use tokio::sync::mpsc;

        struct NullProvider;

        #[async_trait]
        impl ChatProvider for NullProvider {
            fn provider_id(&self) -> ProviderId {
                ProviderId::OpenRouter
            }

            async fn create_completion(
                &self,
                _messages: Vec<ChatMessage>,
                _options: CompletionOptions,
            ) -> Result<String, crate::providers::ProviderError> {
                Ok(String::new())
            }

            async fn stream_completion(
                &self,
                _messages: Vec<ChatMessage>,
                _options: CompletionOptions,
                _tx: mpsc::Sender<StreamEvent>,
            ) -> Result<(), crate::providers::ProviderError> {
                Ok(())
            }

            async fn list_models(&self) -> Vec<ModelInfo> {
                Vec::new()
            }
        }

        let mut router = ProviderRouter::new();
        router.register(std::sync::Arc::new(NullProvider));
        router
    }

    #[test]
    fn test_create_defaults() {
        let mut store = new_store();
        let conv = store.create(None);
        assert_eq!(conv.title, "New Conversation");
        assert!(conv.messages.is_empty());
        assert_eq!(store.current().unwrap().title, "New Conversation");
    }

    #[test]
    fn test_current_never_dangles() {
        let mut store = new_store();
        store.create(Some("a"));
        let id_b = store.create(Some("b")).id.clone();

        // current always refers to a conversation in the list
        assert!(store.get(store.current_id().unwrap()).is_some());

        store.delete(&id_b);
        assert!(store.current().is_none());

        store.select("no-such-id");
        assert!(store.current().is_none());

        let id_a = store.conversations()[0].id.clone();
        store.select(&id_a);
        assert_eq!(store.current().unwrap().id, id_a);
    }

    #[test]
    fn test_delete_non_current_keeps_selection() {
        let mut store = new_store();
        let id_a = store.create(Some("a")).id.clone();
        let id_b = store.create(Some("b")).id.clone();
        assert_eq!(store.current_id(), Some(id_b.as_str()));

        store.delete(&id_a);
        assert_eq!(store.current_id(), Some(id_b.as_str()));
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn test_rename_updates_current_view() {
        let mut store = new_store();
        let id = store.create(None).id.clone();
        store.rename(&id, "Renamed");
        assert_eq!(store.current().unwrap().title, "Renamed");
        assert_eq!(store.get(&id).unwrap().title, "Renamed");
    }

    #[test]
    fn test_duplicate_is_prepended_not_current() {
        let mut store = new_store();
        let id = store.create(Some("Original")).id.clone();
        store.duplicate(&id);

        assert_eq!(store.conversations().len(), 2);
        assert_eq!(store.conversations()[0].title, "Original (Copy)");
        assert_ne!(store.conversations()[0].id, id);
        assert_eq!(store.current().unwrap().id, id);
    }

    #[test]
    fn test_toggle_pin() {
        let mut store = new_store();
        let id = store.create(None).id.clone();
        store.toggle_pin(&id);
        assert!(store.get(&id).unwrap().pinned);
        store.toggle_pin(&id);
        assert!(!store.get(&id).unwrap().pinned);
    }

    #[test]
    fn test_clear_all_erases_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = ConversationStore::load(storage.clone(), Arc::new(test_router()));
        store.create(None);
        assert!(storage.get(config::KEY_CONVERSATIONS).unwrap().is_some());

        store.clear_all();
        assert!(store.conversations().is_empty());
        assert!(store.current().is_none());
        assert!(storage.get(config::KEY_CONVERSATIONS).unwrap().is_none());
        assert!(storage.get(config::KEY_LAST_CONVERSATION).unwrap().is_none());
    }

    #[test]
    fn test_persistence_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let router = Arc::new(test_router());

        let id = {
            let mut store = ConversationStore::load(storage.clone(), router.clone());
            let id = store.create(Some("kept")).id.clone();
            store.append_message(&id, Message::user("hello", Vec::new()));
            id
        };

        let store = ConversationStore::load(storage, router);
        assert_eq!(store.conversations().len(), 1);
        let conv = store.current().expect("selection restored");
        assert_eq!(conv.id, id);
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].content, "hello");
    }

    #[test]
    fn test_load_tolerates_corrupt_payload() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(config::KEY_CONVERSATIONS, "{definitely not json").unwrap();
        storage.set(config::KEY_LAST_CONVERSATION, "stale").unwrap();

        let store = ConversationStore::load(storage, Arc::new(test_router()));
        assert!(store.conversations().is_empty());
        assert!(store.current().is_none());
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut settings = ConversationSettings {
            provider: ProviderId::OpenRouter,
            model: "legacy/model".to_string(),
            temperature: 1.0,
            max_tokens: 512,
            system_prompt: String::new(),
            version: 0,
        };

        assert!(migrate_settings(&mut settings));
        assert_eq!(settings.model, config::DEFAULT_MODEL);
        assert_eq!(settings.system_prompt, config::DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.version, config::SETTINGS_VERSION);
        // user-tunable fields survive
        assert_eq!(settings.temperature, 1.0);
        assert_eq!(settings.max_tokens, 512);

        let snapshot = settings.clone();
        assert!(!migrate_settings(&mut settings));
        assert_eq!(settings, snapshot);
    }

    #[test]
    fn test_migration_preserves_custom_prompt_on_current_version() {
        let mut settings = ConversationSettings {
            system_prompt: "Talk like a pirate.".to_string(),
            ..Default::default()
        };
        assert!(!migrate_settings(&mut settings));
        assert_eq!(settings.system_prompt, "Talk like a pirate.");
    }

    #[test]
    fn test_edit_message_truncates_tail() {
        let mut store = new_store();
        let id = store.create(None).id.clone();
        store.append_message(&id, Message::user("one", Vec::new()));
        let target = Message::user("two", Vec::new());
        let target_id = target.id.clone();
        store.append_message(&id, target);
        store.append_message(&id, Message::user("three", Vec::new()));

        assert!(store.edit_message(&id, &target_id, "edited"));

        let conv = store.get(&id).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[1].content, "edited");
        assert_eq!(conv.messages[1].id, target_id);
    }

    #[test]
    fn test_remove_message_preserves_order() {
        let mut store = new_store();
        let id = store.create(None).id.clone();
        store.append_message(&id, Message::user("one", Vec::new()));
        let target = Message::user("two", Vec::new());
        let target_id = target.id.clone();
        store.append_message(&id, target);
        store.append_message(&id, Message::user("three", Vec::new()));

        assert!(store.remove_message(&id, &target_id));

        let conv = store.get(&id).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].content, "one");
        assert_eq!(conv.messages[1].content, "three");

        assert!(!store.remove_message(&id, "missing"));
    }

    #[test]
    fn test_update_reply_never_duplicates() {
        let mut store = new_store();
        let id = store.create(None).id.clone();
        store.append_message(&id, Message::user("question", Vec::new()));

        let mut reply = Message::assistant("test-model");
        for chunk in ["Hel", "lo", " world"] {
            reply.content.push_str(chunk);
            store.update_reply(&id, &reply);
        }

        let conv = store.get(&id).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[1].content, "Hello world");
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut store = new_store();
        let id = store.create(Some("Round Trip")).id.clone();
        store.append_message(&id, Message::user("ping", Vec::new()));
        let mut reply = Message::assistant("test-model");
        reply.content = "pong".to_string();
        store.append_message(&id, reply);

        let json = store.export_as_text(&id, ExportFormat::Json).unwrap();
        let imported_id = store.import_from_text(&json).unwrap();

        assert_ne!(imported_id, id);
        let imported = store.get(&imported_id).unwrap();
        assert_eq!(imported.title, "Imported Conversation");
        let original = store.get(&id).unwrap();
        assert_eq!(imported.messages.len(), original.messages.len());
        for (a, b) in imported.messages.iter().zip(&original.messages) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }
        // the import becomes current
        assert_eq!(store.current_id(), Some(imported_id.as_str()));
    }

    #[test]
    fn test_import_full_conversation_rekeys() {
        let mut store = new_store();
        let id = store.create(Some("Source")).id.clone();
        store.append_message(&id, Message::user("hi", Vec::new()));
        let json = serde_json::to_string(store.get(&id).unwrap()).unwrap();

        let imported_id = store.import_from_text(&json).unwrap();
        assert_ne!(imported_id, id);
        let imported = store.get(&imported_id).unwrap();
        assert_eq!(imported.title, "Source");
        assert_eq!(imported.messages.len(), 1);
    }

    #[test]
    fn test_import_rejects_malformed_payloads() {
        let mut store = new_store();
        store.create(None);
        let before = store.conversations().len();

        assert!(store.import_from_text("not json at all").is_err());
        assert!(store.import_from_text("{\"title\":\"no messages\"}").is_err());
        assert!(store.import_from_text("42").is_err());

        assert_eq!(store.conversations().len(), before);
    }
}
