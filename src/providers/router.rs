use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::traits::ChatProvider;
use super::types::{
    ChatMessage, CompletionOptions, ExportFormat, ModelInfo, ProviderError, StreamEvent,
};
use crate::models::{Message, ProviderId};

/// Registry of provider adapters keyed by id. The orchestrator and store go
/// through the router so provider selection never leaks into them.
pub struct ProviderRouter {
    providers: HashMap<ProviderId, Arc<dyn ChatProvider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(provider.provider_id(), provider);
    }

    fn get(&self, provider_id: &ProviderId) -> Result<&Arc<dyn ChatProvider>, ProviderError> {
        self.providers
            .get(provider_id)
            .ok_or_else(|| ProviderError::Unavailable(provider_id.as_str().to_string()))
    }

    pub async fn create_completion(
        &self,
        provider_id: &ProviderId,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<String, ProviderError> {
        self.get(provider_id)?.create_completion(messages, options).await
    }

    pub async fn stream_completion(
        &self,
        provider_id: &ProviderId,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        self.get(provider_id)?
            .stream_completion(messages, options, tx)
            .await
    }

    pub async fn generate_title(
        &self,
        provider_id: &ProviderId,
        messages: Vec<ChatMessage>,
    ) -> Result<String, ProviderError> {
        Ok(self.get(provider_id)?.generate_title(messages).await)
    }

    pub async fn list_models(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Vec<ModelInfo>, ProviderError> {
        Ok(self.get(provider_id)?.list_models().await)
    }

    pub async fn summarize_text(
        &self,
        provider_id: &ProviderId,
        text: &str,
        max_words: u32,
    ) -> Result<String, ProviderError> {
        self.get(provider_id)?.summarize_text(text, max_words).await
    }

    pub async fn translate_text(
        &self,
        provider_id: &ProviderId,
        text: &str,
        language: &str,
    ) -> Result<String, ProviderError> {
        self.get(provider_id)?.translate_text(text, language).await
    }

    pub fn export_transcript(
        &self,
        provider_id: &ProviderId,
        messages: &[Message],
        format: ExportFormat,
    ) -> Result<String, ProviderError> {
        Ok(self.get(provider_id)?.export_transcript(messages, format))
    }

    pub fn search_messages<'a>(
        &self,
        provider_id: &ProviderId,
        messages: &'a [Message],
        query: &str,
    ) -> Result<Vec<&'a Message>, ProviderError> {
        Ok(self.get(provider_id)?.search_messages(messages, query))
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}
