//! OpenAI-compatible HTTP client shared by the framework adapters

use crate::adapter::AdapterError;
use agentlab_core::config::{ProviderConfig, DEFAULT_OPENAI_BASE_URL};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_settings(providers: &ProviderConfig) -> Self {
        Self::new(providers.openai_api_key.clone()).with_base_url(&providers.openai_base_url)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /chat/completions
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AdapterError> {
        debug!("Chat request: model={}", request.model);
        self.post("chat/completions", request).await
    }

    /// POST /completions (legacy text completions)
    pub async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, AdapterError> {
        debug!("Completion request: model={}", request.model);
        self.post("completions", request).await
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, AdapterError> {
        let api_key = self.api_key.as_deref().ok_or(AdapterError::MissingApiKey)?;
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Provider error {}: {}", status, error_text);
            return Err(match status.as_u16() {
                401 | 403 => AdapterError::AuthFailed(error_text),
                429 => AdapterError::RateLimited(error_text),
                _ => AdapterError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice.
    pub fn first_content(&self) -> Result<String, AdapterError> {
        self.choices
            .first()
            .map(|c| c.message.content.clone().unwrap_or_default())
            .ok_or_else(|| AdapterError::InvalidResponse("no choices returned".into()))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
}

impl CompletionResponse {
    pub fn first_text(&self) -> Result<String, AdapterError> {
        self.choices
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| AdapterError::InvalidResponse("no choices returned".into()))
    }
}

/// Token usage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "prompt_tokens": self.prompt_tokens,
            "completion_tokens": self.completion_tokens,
            "total_tokens": self.total_tokens,
        })
    }
}
