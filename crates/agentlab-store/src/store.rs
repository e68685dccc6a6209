//! Store trait - primary-key and owner-scoped access to users, agent
//! configurations, and experiments.
//!
//! Implementations must make every experiment update atomic at record level:
//! a concurrent reader sees either the whole previous record or the whole new
//! one. `claim_experiment` and `finish_experiment` are compare-and-set
//! operations; they are how the lifecycle manager enforces exactly-once
//! execution.

use agentlab_core::{
    AgentConfig, AgentId, AgentPatch, Experiment, ExperimentId, ExperimentStatus, NewAgent,
    NewUser, Result, Terminal, User, UserId,
};
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // --- Users and tokens ---

    /// Insert a user. Duplicate username or email is a `Conflict`.
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Look a user up by username or email.
    async fn find_user(&self, login: &str) -> Result<Option<User>>;

    /// Store the password hash for `user`, replacing any previous one.
    async fn set_password_hash(&self, user: UserId, hash: String) -> Result<()>;

    async fn password_hash(&self, user: UserId) -> Result<Option<String>>;

    /// Record an issued token secret for `user`.
    async fn insert_token(&self, user: UserId, secret: String) -> Result<()>;

    /// All live token secrets for `user`.
    async fn token_secrets(&self, user: UserId) -> Result<Vec<String>>;

    /// Revoke a token secret. Returns whether it existed.
    async fn revoke_token(&self, user: UserId, secret: &str) -> Result<bool>;

    // --- Agent registry ---

    async fn insert_agent(
        &self,
        owner: UserId,
        new: NewAgent,
        now: DateTime<Utc>,
    ) -> Result<AgentConfig>;

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentConfig>>;

    async fn get_owned_agent(&self, id: AgentId, owner: UserId) -> Result<Option<AgentConfig>>;

    /// Agents owned by `owner`, oldest first.
    async fn list_agents(&self, owner: UserId) -> Result<Vec<AgentConfig>>;

    /// Apply a patch to an owned agent. `AgentNotFound` if absent or foreign.
    async fn update_agent(
        &self,
        id: AgentId,
        owner: UserId,
        patch: AgentPatch,
        now: DateTime<Utc>,
    ) -> Result<AgentConfig>;

    /// Delete an owned agent. `AgentNotFound` if absent or foreign.
    async fn delete_agent(&self, id: AgentId, owner: UserId) -> Result<()>;

    // --- Experiments ---

    /// Insert a PENDING experiment and return it with its assigned id.
    async fn insert_experiment(
        &self,
        agent_id: AgentId,
        owner: UserId,
        input_data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Experiment>;

    async fn get_experiment(&self, id: ExperimentId) -> Result<Option<Experiment>>;

    async fn get_owned_experiment(
        &self,
        id: ExperimentId,
        owner: UserId,
    ) -> Result<Option<Experiment>>;

    /// Experiments owned by `owner`, ordered by creation time ascending.
    async fn list_experiments(&self, owner: UserId) -> Result<Vec<Experiment>>;

    /// Experiments in `status` across all owners, ordered by creation time.
    async fn list_experiments_by_status(&self, status: ExperimentStatus)
        -> Result<Vec<Experiment>>;

    /// Atomically move PENDING -> RUNNING.
    ///
    /// `Ok(Some(record))` when this call won the claim, `Ok(None)` when the
    /// experiment is no longer PENDING, `ExperimentNotFound` when absent.
    async fn claim_experiment(
        &self,
        id: ExperimentId,
        now: DateTime<Utc>,
    ) -> Result<Option<Experiment>>;

    /// Atomically move RUNNING -> COMPLETED/FAILED. Any other current status
    /// is an `InvalidTransition` and leaves the record untouched.
    async fn finish_experiment(
        &self,
        id: ExperimentId,
        terminal: Terminal,
        now: DateTime<Utc>,
    ) -> Result<Experiment>;
}
