//! Experiment record and its state machine
//!
//! ```text
//! PENDING ──start──> RUNNING ──complete──> COMPLETED
//!                       └──────fail──────> FAILED
//! ```
//!
//! Every mutation goes through `start`, `complete` or `fail`, which refuse
//! any other transition. Field invariants that follow:
//! - `started_at` is set iff status is not PENDING
//! - `completed_at` is set iff status is terminal, and never precedes `started_at`
//! - COMPLETED carries `result` and no `error`; FAILED carries `error`

use crate::error::{Error, Result};
use crate::types::{AgentId, ExperimentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Pending => "pending",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentStatus::Completed | ExperimentStatus::Failed)
    }

    /// The only legal edges: PENDING -> RUNNING -> {COMPLETED, FAILED}.
    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal write applied by the lifecycle manager.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminal {
    Completed(serde_json::Value),
    Failed(String),
}

impl Terminal {
    pub fn status(&self) -> ExperimentStatus {
        match self {
            Terminal::Completed(_) => ExperimentStatus::Completed,
            Terminal::Failed(_) => ExperimentStatus::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub agent_id: AgentId,
    /// Owner of the agent configuration at creation time.
    pub owner_id: UserId,
    pub status: ExperimentStatus,
    pub input_data: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Experiment {
    /// A freshly created experiment: PENDING, no timestamps beyond `created_at`.
    pub fn pending(
        id: ExperimentId,
        agent_id: AgentId,
        owner_id: UserId,
        input_data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            agent_id,
            owner_id,
            status: ExperimentStatus::Pending,
            input_data,
            result: None,
            error: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// PENDING -> RUNNING, stamping `started_at`.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.check(ExperimentStatus::Running)?;
        self.status = ExperimentStatus::Running;
        self.started_at = Some(at);
        Ok(())
    }

    /// RUNNING -> COMPLETED with the adapter's result.
    pub fn complete(&mut self, result: serde_json::Value, at: DateTime<Utc>) -> Result<()> {
        self.finish(Terminal::Completed(result), at)
    }

    /// RUNNING -> FAILED with a human-readable error.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.finish(Terminal::Failed(error.into()), at)
    }

    pub fn finish(&mut self, terminal: Terminal, at: DateTime<Utc>) -> Result<()> {
        self.check(terminal.status())?;
        self.status = terminal.status();
        match terminal {
            Terminal::Completed(result) => {
                self.result = Some(result);
                self.error = None;
            }
            Terminal::Failed(error) => {
                self.error = Some(error);
            }
        }
        // Clock skew must not produce completed_at < started_at.
        let completed = match self.started_at {
            Some(started) if at < started => started,
            _ => at,
        };
        self.completed_at = Some(completed);
        Ok(())
    }

    fn check(&self, to: ExperimentStatus) -> Result<()> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            })
        }
    }
}
