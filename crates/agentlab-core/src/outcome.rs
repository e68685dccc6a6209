//! Adapter outcome - the only thing the lifecycle manager ever sees from a framework

use crate::experiment::Terminal;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    /// The framework completed and produced output.
    Success {
        output: Value,
        metadata: Map<String, Value>,
    },
    /// The framework (or the dispatch path) failed. `message` is never empty.
    Failure { message: String },
}

impl Outcome {
    pub fn success(output: impl Into<Value>) -> Self {
        Self::Success {
            output: output.into(),
            metadata: Map::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        };
        Self::Failure { message }
    }

    /// Failure for a framework tag with no registered adapter.
    pub fn unsupported(tag: &str) -> Self {
        Self::failure(format!("unsupported framework: {}", tag))
    }

    /// Attach a metadata entry. No-op on failures.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Success { metadata, .. } = &mut self {
            metadata.insert(key.into(), value.into());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failure { message } => Some(message),
            Self::Success { .. } => None,
        }
    }

    /// Convert into the terminal write for the experiment record.
    ///
    /// A success is stored as `{"output": .., <metadata>..}`; metadata never
    /// overrides `output`.
    pub fn into_terminal(self) -> Terminal {
        match self {
            Self::Success { output, metadata } => {
                let mut result = metadata;
                result.insert("output".to_string(), output);
                Terminal::Completed(Value::Object(result))
            }
            Self::Failure { message } => Terminal::Failed(message),
        }
    }
}
