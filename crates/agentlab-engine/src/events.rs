//! Lifecycle events broadcast on every persisted transition

use agentlab_core::{Experiment, ExperimentId, ExperimentStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExperimentEvent {
    pub id: ExperimentId,
    pub status: ExperimentStatus,
    /// Timestamp of the transition, taken from the persisted record.
    pub at: DateTime<Utc>,
}

impl ExperimentEvent {
    pub fn from_record(experiment: &Experiment) -> Self {
        let at = match experiment.status {
            ExperimentStatus::Pending => experiment.created_at,
            ExperimentStatus::Running => experiment.started_at.unwrap_or(experiment.created_at),
            ExperimentStatus::Completed | ExperimentStatus::Failed => experiment
                .completed_at
                .or(experiment.started_at)
                .unwrap_or(experiment.created_at),
        };
        Self { id: experiment.id, status: experiment.status, at }
    }
}
