//! In-memory store with optional JSON snapshot persistence
//!
//! Each record lives in a `DashMap` shard; updates clone the record, apply the
//! transition, and write the whole record back while holding the shard lock,
//! so readers never see a partial update. Guards are always dropped before a
//! snapshot flush, which iterates every map.
//!
//! With a snapshot file every mutation rewrites the whole file on the blocking
//! pool. That keeps the runtime free but costs O(store) per write, so the
//! snapshot mode suits single-node deployments with modest data.

use crate::snapshot::{Snapshot, SnapshotFile};
use crate::store::Store;
use agentlab_core::{
    AgentConfig, AgentId, AgentPatch, Error, Experiment, ExperimentId, ExperimentStatus,
    NewAgent, NewUser, Result, Terminal, User, UserId,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

type SnapshotLock = tokio::sync::Mutex<SnapshotFile>;

pub struct MemoryStore {
    users: DashMap<UserId, User>,
    tokens: DashMap<UserId, Vec<String>>,
    credentials: DashMap<UserId, String>,
    agents: DashMap<AgentId, AgentConfig>,
    experiments: DashMap<ExperimentId, Experiment>,
    next_user: AtomicU64,
    next_agent: AtomicU64,
    next_experiment: AtomicU64,
    /// Serializes user registration so uniqueness checks and insert are atomic.
    registration: Mutex<()>,
    /// Serializes snapshot writes; `None` when running purely in memory.
    snapshot: Option<SnapshotLock>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            tokens: DashMap::new(),
            credentials: DashMap::new(),
            agents: DashMap::new(),
            experiments: DashMap::new(),
            next_user: AtomicU64::new(1),
            next_agent: AtomicU64::new(1),
            next_experiment: AtomicU64::new(1),
            registration: Mutex::new(()),
            snapshot: None,
        }
    }

    /// Open a store backed by a snapshot file, loading it if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file = SnapshotFile::new(path);
        let mut store = Self::new();
        if let Some(snapshot) = file.read()? {
            store.restore(snapshot);
            info!(
                "Loaded snapshot {} ({} users, {} agents, {} experiments)",
                file.path().display(),
                store.users.len(),
                store.agents.len(),
                store.experiments.len()
            );
        } else {
            info!("No snapshot at {}, starting empty", file.path().display());
        }
        store.snapshot = Some(SnapshotLock::new(file));
        Ok(store)
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot.is_some()
    }

    fn restore(&mut self, snapshot: Snapshot) {
        for user in snapshot.users {
            self.users.insert(user.id, user);
        }
        for (user, secrets) in snapshot.tokens {
            self.tokens.insert(user, secrets);
        }
        for (user, hash) in snapshot.credentials {
            self.credentials.insert(user, hash);
        }
        for agent in snapshot.agents {
            self.agents.insert(agent.id, agent);
        }
        for exp in snapshot.experiments {
            self.experiments.insert(exp.id, exp);
        }
        // Never hand out an id that already exists, even if the sequence was stale.
        let max_user = self.users.iter().map(|u| u.id.0).max().unwrap_or(0);
        let max_agent = self.agents.iter().map(|a| a.id.0).max().unwrap_or(0);
        let max_exp = self.experiments.iter().map(|e| e.id.0).max().unwrap_or(0);
        self.next_user = AtomicU64::new(snapshot.next_user.max(max_user + 1));
        self.next_agent = AtomicU64::new(snapshot.next_agent.max(max_agent + 1));
        self.next_experiment = AtomicU64::new(snapshot.next_experiment.max(max_exp + 1));
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        let mut tokens: Vec<(UserId, Vec<String>)> = self
            .tokens
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        tokens.sort_by_key(|(u, _)| *u);
        let mut credentials: Vec<(UserId, String)> = self
            .credentials
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        credentials.sort_by_key(|(u, _)| *u);
        let mut agents: Vec<AgentConfig> = self.agents.iter().map(|e| e.value().clone()).collect();
        agents.sort_by_key(|a| a.id);
        let mut experiments: Vec<Experiment> =
            self.experiments.iter().map(|e| e.value().clone()).collect();
        experiments.sort_by_key(|e| e.id);
        Snapshot {
            next_user: self.next_user.load(Ordering::SeqCst),
            next_agent: self.next_agent.load(Ordering::SeqCst),
            next_experiment: self.next_experiment.load(Ordering::SeqCst),
            users,
            tokens,
            credentials,
            agents,
            experiments,
        }
    }

    /// Persist the current state. No-op without a snapshot file. The lock
    /// is held from capture to rename so a later state never gets overwritten
    /// by an earlier one.
    async fn flush(&self) -> Result<()> {
        let Some(file) = &self.snapshot else { return Ok(()) };
        let file = file.lock().await;
        let snapshot = self.to_snapshot();
        let target = file.clone();
        tokio::task::spawn_blocking(move || target.write(&snapshot))
            .await
            .map_err(|e| Error::storage(format!("snapshot writer failed: {}", e)))?
            .map_err(|e| Error::storage(format!("snapshot write failed: {}", e)))?;
        debug!("Snapshot flushed to {}", file.path().display());
        Ok(())
    }

    fn sorted_experiments(&self, filter: impl Fn(&Experiment) -> bool) -> Vec<Experiment> {
        let mut list: Vec<Experiment> = self
            .experiments
            .iter()
            .filter(|e| filter(e.value()))
            .map(|e| e.value().clone())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User> {
        let user = {
            let _guard = self
                .registration
                .lock()
                .map_err(|_| Error::storage("registration lock poisoned"))?;
            if self.users.iter().any(|u| u.username == new.username) {
                return Err(Error::conflict("username already registered"));
            }
            if self.users.iter().any(|u| u.email == new.email) {
                return Err(Error::conflict("email already registered"));
            }
            let user = User {
                id: UserId(self.next_user.fetch_add(1, Ordering::SeqCst)),
                username: new.username,
                email: new.email,
                created_at: now,
            };
            self.users.insert(user.id, user.clone());
            user
        };
        self.flush().await?;
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_user(&self, login: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == login || u.email == login)
            .map(|u| u.value().clone()))
    }

    async fn set_password_hash(&self, user: UserId, hash: String) -> Result<()> {
        if !self.users.contains_key(&user) {
            return Err(Error::UserNotFound);
        }
        self.credentials.insert(user, hash);
        self.flush().await
    }

    async fn password_hash(&self, user: UserId) -> Result<Option<String>> {
        Ok(self.credentials.get(&user).map(|h| h.clone()))
    }

    async fn insert_token(&self, user: UserId, secret: String) -> Result<()> {
        if !self.users.contains_key(&user) {
            return Err(Error::UserNotFound);
        }
        self.tokens.entry(user).or_default().push(secret);
        self.flush().await
    }

    async fn token_secrets(&self, user: UserId) -> Result<Vec<String>> {
        Ok(self.tokens.get(&user).map(|t| t.clone()).unwrap_or_default())
    }

    async fn revoke_token(&self, user: UserId, secret: &str) -> Result<bool> {
        let removed = match self.tokens.get_mut(&user) {
            Some(mut secrets) => {
                let before = secrets.len();
                secrets.retain(|s| s != secret);
                secrets.len() != before
            }
            None => false,
        };
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    async fn insert_agent(
        &self,
        owner: UserId,
        new: NewAgent,
        now: DateTime<Utc>,
    ) -> Result<AgentConfig> {
        let agent = AgentConfig {
            id: AgentId(self.next_agent.fetch_add(1, Ordering::SeqCst)),
            owner_id: owner,
            name: new.name,
            framework: new.framework,
            config: new.config,
            created_at: now,
            updated_at: now,
        };
        self.agents.insert(agent.id, agent.clone());
        self.flush().await?;
        Ok(agent)
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentConfig>> {
        Ok(self.agents.get(&id).map(|a| a.clone()))
    }

    async fn get_owned_agent(&self, id: AgentId, owner: UserId) -> Result<Option<AgentConfig>> {
        Ok(self
            .agents
            .get(&id)
            .filter(|a| a.owner_id == owner)
            .map(|a| a.clone()))
    }

    async fn list_agents(&self, owner: UserId) -> Result<Vec<AgentConfig>> {
        let mut list: Vec<AgentConfig> = self
            .agents
            .iter()
            .filter(|a| a.owner_id == owner)
            .map(|a| a.value().clone())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn update_agent(
        &self,
        id: AgentId,
        owner: UserId,
        patch: AgentPatch,
        now: DateTime<Utc>,
    ) -> Result<AgentConfig> {
        let updated = {
            let mut entry = self
                .agents
                .get_mut(&id)
                .filter(|a| a.owner_id == owner)
                .ok_or(Error::AgentNotFound(id))?;
            let mut next = entry.clone();
            patch.apply(&mut next, now);
            *entry = next.clone();
            next
        };
        self.flush().await?;
        Ok(updated)
    }

    async fn delete_agent(&self, id: AgentId, owner: UserId) -> Result<()> {
        self.agents
            .remove_if(&id, |_, a| a.owner_id == owner)
            .ok_or(Error::AgentNotFound(id))?;
        self.flush().await
    }

    async fn insert_experiment(
        &self,
        agent_id: AgentId,
        owner: UserId,
        input_data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Experiment> {
        let id = ExperimentId(self.next_experiment.fetch_add(1, Ordering::SeqCst));
        let exp = Experiment::pending(id, agent_id, owner, input_data, now);
        self.experiments.insert(id, exp.clone());
        self.flush().await?;
        Ok(exp)
    }

    async fn get_experiment(&self, id: ExperimentId) -> Result<Option<Experiment>> {
        Ok(self.experiments.get(&id).map(|e| e.clone()))
    }

    async fn get_owned_experiment(
        &self,
        id: ExperimentId,
        owner: UserId,
    ) -> Result<Option<Experiment>> {
        Ok(self
            .experiments
            .get(&id)
            .filter(|e| e.owner_id == owner)
            .map(|e| e.clone()))
    }

    async fn list_experiments(&self, owner: UserId) -> Result<Vec<Experiment>> {
        Ok(self.sorted_experiments(|e| e.owner_id == owner))
    }

    async fn list_experiments_by_status(
        &self,
        status: ExperimentStatus,
    ) -> Result<Vec<Experiment>> {
        Ok(self.sorted_experiments(|e| e.status == status))
    }

    async fn claim_experiment(
        &self,
        id: ExperimentId,
        now: DateTime<Utc>,
    ) -> Result<Option<Experiment>> {
        let claimed = {
            let mut entry = self
                .experiments
                .get_mut(&id)
                .ok_or(Error::ExperimentNotFound(id))?;
            if entry.status != ExperimentStatus::Pending {
                return Ok(None);
            }
            let mut next = entry.clone();
            next.start(now)?;
            *entry = next.clone();
            next
        };
        self.flush().await?;
        Ok(Some(claimed))
    }

    async fn finish_experiment(
        &self,
        id: ExperimentId,
        terminal: Terminal,
        now: DateTime<Utc>,
    ) -> Result<Experiment> {
        let finished = {
            let mut entry = self
                .experiments
                .get_mut(&id)
                .ok_or(Error::ExperimentNotFound(id))?;
            let mut next = entry.clone();
            next.finish(terminal, now)?;
            *entry = next.clone();
            next
        };
        self.flush().await?;
        Ok(finished)
    }
}
