use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc;
use url::Url;

use super::models::*;
use super::stream::parse_sse_stream;
use crate::config;
use crate::models::ProviderId;
use crate::providers::traits::ChatProvider;
use crate::providers::types::{
    ChatMessage, CompletionOptions, ModelInfo, ProviderError, StreamEvent,
};
use crate::services::keys::ApiKeyStore;

// Adapter-level defaults applied when a request omits an option.
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 1.0;
const DEFAULT_FREQUENCY_PENALTY: f32 = 2.0;
const DEFAULT_PRESENCE_PENALTY: f32 = 2.0;

pub struct OpenRouterProvider {
    client: Client,
    base_url: Url,
    keys: ApiKeyStore,
}

impl OpenRouterProvider {
    pub fn new(keys: ApiKeyStore) -> Self {
        let base_url = Url::parse(config::OPENROUTER_BASE_URL)
            .expect("built-in base URL must parse");
        Self {
            client: Client::new(),
            base_url,
            keys,
        }
    }

    /// Point the adapter at a different OpenRouter-compatible endpoint.
    pub fn with_base_url(keys: ApiKeyStore, base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
            keys,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn require_key(&self) -> Result<String, ProviderError> {
        self.keys.get().ok_or_else(|| {
            ProviderError::Auth(format!(
                "OpenRouter API key is missing. Get one from {} and set it first.",
                config::OPENROUTER_KEYS_URL
            ))
        })
    }

    fn build_request(
        messages: Vec<ChatMessage>,
        options: &CompletionOptions,
        stream: bool,
    ) -> OpenRouterRequest {
        OpenRouterRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| config::DEFAULT_MODEL.to_string()),
            messages: messages
                .into_iter()
                .map(|m| OpenRouterMessage {
                    role: m.role.as_str().to_string(),
                    content: Some(m.content),
                })
                .collect(),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: options.max_tokens.unwrap_or(config::DEFAULT_MAX_TOKENS),
            top_p: options.top_p.unwrap_or(DEFAULT_TOP_P),
            frequency_penalty: options
                .frequency_penalty
                .unwrap_or(DEFAULT_FREQUENCY_PENALTY),
            presence_penalty: options.presence_penalty.unwrap_or(DEFAULT_PRESENCE_PENALTY),
            stream,
        }
    }

    fn parse_error_message(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<OpenRouterErrorResponse>(body) {
            return parsed.error.message;
        }
        format!("{} request failed", status.as_u16())
    }

    /// Map a non-success response onto the error taxonomy. 401/403 become
    /// the actionable authentication error.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            let body = response.text().await.unwrap_or_default();
            let detail = Self::parse_error_message(status, &body);
            return Err(ProviderError::Auth(format!(
                "{}. Check your API key at {}",
                detail,
                config::OPENROUTER_KEYS_URL
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: Self::parse_error_message(status, &body),
            });
        }
        Ok(response)
    }

    async fn post_completions(
        &self,
        messages: Vec<ChatMessage>,
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.require_key()?;
        let body = Self::build_request(messages, options, stream);

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .header("content-type", "application/json")
            .header("HTTP-Referer", config::APP_REFERER)
            .header("X-Title", config::APP_NAME)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Self::check_status(response).await
    }

    fn default_models() -> Vec<ModelInfo> {
        [
            (
                config::DEFAULT_MODEL,
                "MiniMax M2 (Free)",
                "MiniMax's flagship reasoning model",
            ),
            (
                "meta-llama/llama-3.2-3b-instruct:free",
                "Llama 3.2 3B Instruct (Free)",
                "Meta's efficient Llama 3.2 model for instruction following",
            ),
            (
                "google/gemini-flash-1.5:free",
                "Gemini Flash 1.5 (Free)",
                "Google's fast Gemini Flash model",
            ),
            (
                "qwen/qwen-2.5-coder-32b-instruct:free",
                "Qwen 2.5 Coder 32B (Free)",
                "Alibaba's Qwen 2.5 coder model optimized for programming",
            ),
        ]
        .into_iter()
        .map(|(id, name, description)| ModelInfo {
            id: id.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            context_length: None,
        })
        .collect()
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::OpenRouter
    }

    async fn create_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<String, ProviderError> {
        let response = self.post_completions(messages, &options, false).await?;

        let parsed: OpenRouterResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No content in response".to_string(),
            ));
        }

        Ok(content)
    }

    async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let response = self.post_completions(messages, &options, true).await?;
        parse_sse_stream(response.bytes_stream(), tx).await;
        Ok(())
    }

    /// Free models available through the account, with a small built-in
    /// catalog as the fallback when the listing cannot be fetched.
    async fn list_models(&self) -> Vec<ModelInfo> {
        let api_key = match self.require_key() {
            Ok(key) => key,
            Err(_) => return Self::default_models(),
        };

        let response = match self
            .client
            .get(self.endpoint("models"))
            .header("HTTP-Referer", config::APP_REFERER)
            .bearer_auth(api_key)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!("Model listing returned {}; using defaults", r.status());
                return Self::default_models();
            }
            Err(e) => {
                tracing::warn!("Failed to fetch model listing: {}; using defaults", e);
                return Self::default_models();
            }
        };

        match response.json::<OpenRouterModelList>().await {
            Ok(list) => list
                .data
                .into_iter()
                .filter(|m| m.id.ends_with(":free"))
                .map(|m| ModelInfo {
                    name: m.name.unwrap_or_else(|| m.id.clone()),
                    id: m.id,
                    description: m.description,
                    context_length: m.context_length,
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to parse model listing: {}; using defaults", e);
                Self::default_models()
            }
        }
    }
}
