//! Agentlab Frameworks - adapters for external agent frameworks and the dispatcher
//!
//! Each adapter is a self-contained file implementing the `Adapter` trait.
//! To add a framework: add a `Framework` variant, write the adapter, and
//! register it in `create_default_dispatcher()` below. Nothing else changes.

pub mod adapter;
pub mod client;
pub mod crewai;
pub mod dispatch;
pub mod langchain;
pub mod openai;

pub use adapter::{Adapter, AdapterError};
pub use client::OpenAiClient;
pub use dispatch::Dispatcher;

use agentlab_core::Settings;
use std::sync::Arc;

/// Create the dispatcher with every built-in adapter registered, sharing one
/// HTTP client configured from `settings`.
pub fn create_default_dispatcher(settings: &Settings) -> Dispatcher {
    let client = Arc::new(OpenAiClient::from_settings(&settings.providers));
    let mut dispatcher = Dispatcher::new().with_timeout(settings.execution.adapter_timeout());

    dispatcher.register(crewai::CrewAiAdapter::new(client.clone()));
    dispatcher.register(langchain::LangChainAdapter::new(client.clone()));
    dispatcher.register(openai::OpenAiAdapter::new(client));

    dispatcher
}
