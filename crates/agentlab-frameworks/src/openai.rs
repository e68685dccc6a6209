//! OpenAI chat-completion adapter

use crate::adapter::{contain, param_f32, param_str, param_u32, Adapter, AdapterError};
use crate::client::{ChatMessage, ChatRequest, OpenAiClient};
use agentlab_core::{Framework, Outcome};
use serde_json::Value;
use std::sync::Arc;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_SYSTEM: &str = "You are a helpful assistant";
const DEFAULT_PROMPT: &str = "Hello!";

pub struct OpenAiAdapter {
    client: Arc<OpenAiClient>,
}

impl OpenAiAdapter {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    /// Build the request from the agent config and experiment input.
    pub fn build_request(config: &Value, input: &Value) -> ChatRequest {
        ChatRequest {
            model: param_str(config, "model", DEFAULT_MODEL).to_string(),
            messages: vec![
                ChatMessage::system(param_str(config, "system_message", DEFAULT_SYSTEM)),
                ChatMessage::user(param_str(input, "prompt", DEFAULT_PROMPT)),
            ],
            temperature: param_f32(config, "temperature", 0.7),
            max_tokens: param_u32(config, "max_tokens", 1500),
        }
    }

    async fn run(&self, config: &Value, input: &Value) -> Result<Outcome, AdapterError> {
        let request = Self::build_request(config, input);
        let response = self.client.chat(&request).await?;
        let output = response.first_content()?;
        let usage = response.usage.unwrap_or_default();

        Ok(Outcome::success(output)
            .with_metadata("framework", Framework::OpenAi.as_str())
            .with_metadata("usage", usage.to_json())
            .with_metadata("config", config.clone()))
    }
}

#[async_trait::async_trait]
impl Adapter for OpenAiAdapter {
    fn framework(&self) -> Framework {
        Framework::OpenAi
    }

    async fn execute(&self, config: &Value, input: &Value) -> Outcome {
        contain(self.framework(), self.run(config, input).await)
    }
}
