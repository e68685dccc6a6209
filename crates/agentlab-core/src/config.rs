//! Process settings
//!
//! Constructed once at startup and handed to every component that needs it.
//! Loaded from TOML, falls back to defaults if no config file exists, then
//! overlaid with environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub providers: ProviderConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: BindMode,
}

/// Bind mode for the HTTP server
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
}

/// Authentication mode
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Per-user bearer tokens issued at registration.
    #[default]
    Token,
    /// Every request acts as the built-in local user.
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file. In-memory only when unset.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub openai_api_key: Option<String>,
    /// Reserved for an Anthropic-backed adapter. Loaded and redacted, but no
    /// built-in adapter reads it.
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on experiments executing at once.
    pub max_concurrent_runs: usize,
    /// Capacity of the scheduling queue.
    pub queue_capacity: usize,
    /// Per-adapter-call timeout in seconds. 0 disables the timeout.
    pub adapter_timeout_secs: u64,
    /// How often PENDING experiments that missed the queue are offered
    /// again, in seconds. 0 disables the sweep.
    pub pending_sweep_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind: BindMode::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 8,
            queue_capacity: 1024,
            adapter_timeout_secs: 300,
            pending_sweep_secs: 5,
        }
    }
}

impl ExecutionConfig {
    pub fn adapter_timeout(&self) -> Option<std::time::Duration> {
        (self.adapter_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.adapter_timeout_secs))
    }

    pub fn pending_sweep(&self) -> Option<std::time::Duration> {
        (self.pending_sweep_secs > 0)
            .then(|| std::time::Duration::from_secs(self.pending_sweep_secs))
    }
}

impl Settings {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay environment variables onto the loaded settings.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; split out so tests need not touch the
    /// process environment.
    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.providers.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()) {
            self.providers.anthropic_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.is_empty()) {
            self.providers.openai_base_url = url;
        }
        if let Some(port) = lookup("AGENTLAB_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("AGENTLAB_PORT is not a port: {}", port)))?;
        }
        if let Some(path) = lookup("AGENTLAB_SNAPSHOT").filter(|p| !p.is_empty()) {
            self.store.snapshot_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.max_concurrent_runs == 0 {
            return Err(Error::Config("execution.max_concurrent_runs must be > 0".into()));
        }
        if self.execution.queue_capacity == 0 {
            return Err(Error::Config("execution.queue_capacity must be > 0".into()));
        }
        Ok(())
    }

    /// Copy safe to print: API keys masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.providers.openai_api_key = copy.providers.openai_api_key.as_deref().map(mask);
        copy.providers.anthropic_api_key = copy.providers.anthropic_api_key.as_deref().map(mask);
        copy
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
