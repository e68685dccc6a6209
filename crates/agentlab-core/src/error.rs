//! Error types for Agentlab

use crate::experiment::ExperimentStatus;
use crate::types::{AgentId, ExperimentId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent not found")]
    AgentNotFound(AgentId),

    #[error("Experiment not found")]
    ExperimentNotFound(ExperimentId),

    #[error("User not found")]
    UserNotFound,

    #[error("Experiment is not completed yet")]
    NotReady {
        id: ExperimentId,
        status: ExperimentStatus,
    },

    #[error("invalid transition for experiment {id}: {from} -> {to}")]
    InvalidTransition {
        id: ExperimentId,
        from: ExperimentStatus,
        to: ExperimentStatus,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// True for the "record does not exist (for this caller)" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AgentNotFound(_) | Self::ExperimentNotFound(_) | Self::UserNotFound
        )
    }
}
