//! JSON snapshot persistence for the in-memory store

use agentlab_core::{AgentConfig, Error, Experiment, Result, User, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full store contents plus id sequences.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_user: u64,
    pub next_agent: u64,
    pub next_experiment: u64,
    pub users: Vec<User>,
    pub tokens: Vec<(UserId, Vec<String>)>,
    /// Password hashes; absent in snapshots written before login existed.
    #[serde(default)]
    pub credentials: Vec<(UserId, String)>,
    pub agents: Vec<AgentConfig>,
    pub experiments: Vec<Experiment>,
}

/// Reads and atomically replaces a snapshot file.
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub fn read(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&content).map_err(|e| {
            Error::storage(format!("corrupt snapshot {}: {}", self.path.display(), e))
        })?;
        Ok(Some(snapshot))
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
