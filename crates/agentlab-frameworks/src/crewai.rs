//! CrewAI-style adapter: a one-agent, one-task crew
//!
//! The agent persona (role, goal, backstory) becomes the system message and
//! the task description the user message.

use crate::adapter::{
    contain, extract_final_answer, param_bool, param_f32, param_str, param_u32, Adapter,
    AdapterError,
};
use crate::client::{ChatMessage, ChatRequest, OpenAiClient};
use agentlab_core::{Framework, Outcome};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct CrewAiAdapter {
    client: Arc<OpenAiClient>,
}

impl CrewAiAdapter {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }

    pub fn build_request(config: &Value, input: &Value) -> ChatRequest {
        let role = param_str(config, "role", "Assistant");
        let goal = param_str(config, "goal", "Help the user");
        let backstory = param_str(config, "backstory", "Helpful assistant");
        let task = param_str(input, "task", "Complete the assigned task");

        let persona = format!(
            "You are {}. {}\nYour personal goal is: {}",
            role, backstory, goal
        );
        let assignment = format!(
            "Current Task: {}\n\n\
             This is the expected criteria for your final answer: the complete result of the task.\n\
             You MUST return the actual complete content as the final answer, not a summary.\n\n\
             Begin! Give your best Final Answer.\n\nThought:",
            task
        );

        ChatRequest {
            model: param_str(config, "llm", DEFAULT_MODEL).to_string(),
            messages: vec![ChatMessage::system(persona), ChatMessage::user(assignment)],
            temperature: param_f32(config, "temperature", 0.7),
            max_tokens: param_u32(config, "max_tokens", 2000),
        }
    }

    async fn run(&self, config: &Value, input: &Value) -> Result<Outcome, AdapterError> {
        let request = Self::build_request(config, input);
        let verbose = param_bool(config, "verbose", false);
        if verbose {
            debug!("crewai persona: {}", request.messages[0].content);
        }
        let response = self.client.chat(&request).await?;
        let text = response.first_content()?;
        if verbose {
            debug!("crewai raw answer:\n{}", text);
        }

        Ok(Outcome::success(extract_final_answer(&text))
            .with_metadata("framework", Framework::CrewAi.as_str())
            .with_metadata("config", config.clone()))
    }
}

#[async_trait::async_trait]
impl Adapter for CrewAiAdapter {
    fn framework(&self) -> Framework {
        Framework::CrewAi
    }

    async fn execute(&self, config: &Value, input: &Value) -> Outcome {
        contain(self.framework(), self.run(config, input).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn persona_defaults() {
        let req = CrewAiAdapter::build_request(&json!({}), &json!({}));
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(
            req.messages[0].content,
            "You are Assistant. Helpful assistant\nYour personal goal is: Help the user"
        );
        assert!(req.messages[1].content.starts_with("Current Task: Complete the assigned task"));
    }

    #[test]
    fn persona_from_config() {
        let req = CrewAiAdapter::build_request(
            &json!({"role": "Researcher", "goal": "Find facts", "backstory": "Ex-librarian", "llm": "gpt-4o"}),
            &json!({"task": "Summarize Rust ownership"}),
        );
        assert_eq!(req.model, "gpt-4o");
        assert!(req.messages[0].content.starts_with("You are Researcher. Ex-librarian"));
        assert!(req.messages[1].content.contains("Summarize Rust ownership"));
    }
}
