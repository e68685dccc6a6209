//! Dispatcher - routes a framework to its registered adapter
//!
//! Pure routing plus two containment guards around the adapter call: an
//! optional timeout and panic capture. Whatever happens, the caller gets an
//! `Outcome`.

use crate::adapter::Adapter;
use agentlab_core::{Framework, Outcome};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct Dispatcher {
    adapters: HashMap<Framework, Arc<dyn Adapter>>,
    timeout: Option<Duration>,
}

impl Default for Dispatcher {
    fn default() -> Self { Self::new() }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { adapters: HashMap::new(), timeout: None }
    }

    /// Bound every adapter call. `None` lets calls run to completion.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register an adapter under its framework. Replaces any existing one.
    pub fn register(&mut self, adapter: impl Adapter + 'static) {
        self.register_arc(Arc::new(adapter));
    }

    pub fn register_arc(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(adapter.framework(), adapter);
    }

    pub fn get(&self, framework: Framework) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(&framework).cloned()
    }

    /// Registered frameworks, in declaration order.
    pub fn frameworks(&self) -> Vec<Framework> {
        Framework::ALL
            .into_iter()
            .filter(|fw| self.adapters.contains_key(fw))
            .collect()
    }

    /// Route to the adapter for `framework`. No registered adapter yields
    /// `Failure("unsupported framework: <tag>")` without invoking anything.
    pub async fn dispatch(&self, framework: Framework, config: &Value, input: &Value) -> Outcome {
        match self.get(framework) {
            Some(adapter) => self.invoke(framework, adapter, config, input).await,
            None => {
                warn!("No adapter registered for {}", framework);
                Outcome::unsupported(framework.as_str())
            }
        }
    }

    /// Route by raw tag. Unknown tags are unsupported.
    pub async fn dispatch_tag(&self, tag: &str, config: &Value, input: &Value) -> Outcome {
        match tag.parse::<Framework>() {
            Ok(framework) => self.dispatch(framework, config, input).await,
            Err(_) => {
                warn!("Unknown framework tag {:?}", tag);
                Outcome::unsupported(tag)
            }
        }
    }

    async fn invoke(
        &self,
        framework: Framework,
        adapter: Arc<dyn Adapter>,
        config: &Value,
        input: &Value,
    ) -> Outcome {
        debug!("Dispatching to {} adapter", framework);
        let call = AssertUnwindSafe(adapter.execute(config, input)).catch_unwind();

        let caught = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(caught) => caught,
                Err(_) => {
                    warn!("{} adapter timed out after {:?}", framework, limit);
                    return Outcome::failure(format!(
                        "{} execution timed out after {:?}",
                        framework, limit
                    ));
                }
            },
            None => call.await,
        };

        match caught {
            Ok(outcome) => {
                if let Some(message) = outcome.message() {
                    warn!("{} adapter failed: {}", framework, message);
                }
                outcome
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("{} adapter panicked: {}", framework, reason);
                Outcome::failure(format!("{} adapter panicked: {}", framework, reason))
            }
        }
    }
}
