//! LangChain-style zero-shot ReAct agent over the text completions endpoint

use crate::adapter::{
    contain, extract_final_answer, param_bool, param_f32, param_str, param_u32, Adapter,
    AdapterError,
};
use crate::client::{CompletionRequest, OpenAiClient};
use agentlab_core::{Framework, Outcome};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo-instruct";
const DEFAULT_PROMPT: &str = "Hello!";

const REACT_TEMPLATE: &str = "Answer the following questions as best you can. \
You have no tools available, so answer directly.

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Final Answer: the final answer to the original input question

Begin!

Question: {input}
Thought:";

pub struct LangChainAdapter {
    client: Arc<OpenAiClient>,
}

impl LangChainAdapter {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    pub fn build_request(config: &Value, input: &Value) -> CompletionRequest {
        let question = param_str(input, "prompt", DEFAULT_PROMPT);
        CompletionRequest {
            model: param_str(config, "llm", DEFAULT_MODEL).to_string(),
            prompt: REACT_TEMPLATE.replace("{input}", question),
            temperature: param_f32(config, "temperature", 0.7),
            max_tokens: param_u32(config, "max_tokens", 2000),
            stop: Some(vec!["\nObservation:".to_string()]),
        }
    }

    async fn run(&self, config: &Value, input: &Value) -> Result<Outcome, AdapterError> {
        let request = Self::build_request(config, input);
        if param_bool(config, "verbose", false) {
            debug!("langchain prompt:\n{}", request.prompt);
        }
        let response = self.client.completion(&request).await?;
        let text = response.first_text()?;
        if param_bool(config, "verbose", false) {
            debug!("langchain raw completion:\n{}", text);
        }

        Ok(Outcome::success(extract_final_answer(&text))
            .with_metadata("framework", Framework::LangChain.as_str())
            .with_metadata("config", config.clone()))
    }
}

#[async_trait::async_trait]
impl Adapter for LangChainAdapter {
    fn framework(&self) -> Framework {
        Framework::LangChain
    }

    async fn execute(&self, config: &Value, input: &Value) -> Outcome {
        contain(self.framework(), self.run(config, input).await)
    }
}
