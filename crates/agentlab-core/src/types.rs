//! Core types for Agentlab

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User identifier, assigned by the store.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Agent configuration identifier, assigned by the store.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

/// Experiment identifier, assigned by the store. Immutable once created.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported agent-execution frameworks.
///
/// The serialized form is the framework tag stored on agent configurations
/// (`"crewai"`, `"langchain"`, `"openai"`).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    CrewAi,
    LangChain,
    OpenAi,
}

impl Framework {
    pub const ALL: [Framework; 3] = [Framework::CrewAi, Framework::LangChain, Framework::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::CrewAi => "crewai",
            Framework::LangChain => "langchain",
            Framework::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Framework::ALL
            .into_iter()
            .find(|fw| fw.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unsupported framework: {}", s)))
    }
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a user.
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<()> {
        let len = self.username.chars().count();
        if !(3..=50).contains(&len) {
            return Err(Error::validation("username must be 3-50 characters"));
        }
        if !self.email.contains('@') {
            return Err(Error::validation("email is not valid"));
        }
        Ok(())
    }
}

/// An owner-scoped agent configuration: a framework tag plus an opaque,
/// framework-specific configuration payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    pub owner_id: UserId,
    pub name: String,
    pub framework: Framework,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating an agent configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub framework: Framework,
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

impl NewAgent {
    pub fn validate(&self) -> Result<()> {
        validate_agent_name(&self.name)?;
        validate_config_payload(&self.config)
    }
}

/// Partial update of an agent configuration. Absent fields are left unchanged.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub framework: Option<Framework>,
    pub config: Option<serde_json::Value>,
}

impl AgentPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_agent_name(name)?;
        }
        if let Some(config) = &self.config {
            validate_config_payload(config)?;
        }
        Ok(())
    }

    pub fn apply(self, agent: &mut AgentConfig, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            agent.name = name;
        }
        if let Some(framework) = self.framework {
            agent.framework = framework;
        }
        if let Some(config) = self.config {
            agent.config = config;
        }
        agent.updated_at = now;
    }
}

fn validate_agent_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > 200 {
        return Err(Error::validation("name must be 1-200 characters"));
    }
    Ok(())
}

fn validate_config_payload(config: &serde_json::Value) -> Result<()> {
    if !config.is_object() {
        return Err(Error::validation("config must be a JSON object"));
    }
    Ok(())
}

pub fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
