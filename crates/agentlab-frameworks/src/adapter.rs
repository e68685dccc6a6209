//! Adapter trait and the fault-containment boundary
//!
//! An adapter never lets an error escape `execute`: every internal failure
//! becomes `Outcome::Failure` carrying the framework tag and a description.

use agentlab_core::{Framework, Outcome};
use serde_json::Value;

/// Internal adapter errors. Never leave the adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl AdapterError {
    /// Errors the operator fixes by supplying credentials.
    pub fn is_credential_problem(&self) -> bool {
        matches!(self, Self::MissingApiKey | Self::AuthFailed(_))
    }
}

/// The Adapter trait - implement this to support a new framework.
#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    /// Framework this adapter executes; the dispatcher's routing key.
    fn framework(&self) -> Framework;

    /// Run one experiment. `config` is the agent configuration payload and
    /// `input` the experiment's input data. Never fails: errors are returned
    /// as `Outcome::Failure`.
    async fn execute(&self, config: &Value, input: &Value) -> Outcome;
}

/// Convert an adapter-internal result into an outcome.
pub fn contain(framework: Framework, result: Result<Outcome, AdapterError>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_credential_problem() => Outcome::failure(format!(
            "{} execution failed: {}. Make sure API keys are configured.",
            framework, e
        )),
        Err(e) => Outcome::failure(format!("{} execution failed: {}", framework, e)),
    }
}

// ---------------------------------------------------------------------------
// Permissive parameter lookup: absent or mistyped keys fall back to defaults.
// ---------------------------------------------------------------------------

pub fn param_str<'a>(params: &'a Value, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub fn param_f32(params: &Value, key: &str, default: f32) -> f32 {
    params
        .get(key)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

pub fn param_u32(params: &Value, key: &str, default: u32) -> u32 {
    params
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

pub fn param_bool(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Text after the last `Final Answer:` marker, or the whole trimmed text.
pub fn extract_final_answer(text: &str) -> String {
    match text.rfind("Final Answer:") {
        Some(idx) => text[idx + "Final Answer:".len()..].trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_fall_back_on_missing_or_mistyped() {
        let cfg = json!({"model": "gpt-4o", "temperature": "hot", "max_tokens": 64, "verbose": true});
        assert_eq!(param_str(&cfg, "model", "x"), "gpt-4o");
        assert_eq!(param_str(&cfg, "absent", "x"), "x");
        assert_eq!(param_f32(&cfg, "temperature", 0.7), 0.7);
        assert_eq!(param_u32(&cfg, "max_tokens", 1500), 64);
        assert!(param_bool(&cfg, "verbose", false));
    }

    #[test]
    fn params_on_non_object_payload() {
        let cfg = json!(["not", "an", "object"]);
        assert_eq!(param_str(&cfg, "model", "gpt-3.5-turbo"), "gpt-3.5-turbo");
        assert_eq!(param_u32(&cfg, "max_tokens", 10), 10);
    }

    #[test]
    fn negative_or_huge_numbers_use_default() {
        let cfg = json!({"a": -1, "b": 10_000_000_000u64});
        assert_eq!(param_u32(&cfg, "a", 5), 5);
        assert_eq!(param_u32(&cfg, "b", 5), 5);
    }

    #[test]
    fn final_answer_extraction() {
        assert_eq!(
            extract_final_answer("Thought: easy\nFinal Answer:  Paris \n"),
            "Paris"
        );
        assert_eq!(extract_final_answer("  just text "), "just text");
    }

    #[test]
    fn contain_tags_failures_with_framework() {
        let missing = contain(Framework::OpenAi, Err(AdapterError::MissingApiKey));
        let msg = missing.message().unwrap();
        assert!(msg.starts_with("openai execution failed"));
        assert!(msg.contains("Make sure API keys are configured"));

        let bad = contain(
            Framework::CrewAi,
            Err(AdapterError::InvalidResponse("no choices".into())),
        );
        assert_eq!(
            bad.message(),
            Some("crewai execution failed: invalid response: no choices")
        );
    }
}
