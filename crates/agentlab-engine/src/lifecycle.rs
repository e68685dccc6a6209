//! Experiment lifecycle: creation, execution, reads, and restart recovery
//!
//! ```text
//! create ──insert PENDING──> schedule ──> run
//!                                          ├─ claim PENDING -> RUNNING   (store CAS)
//!                                          ├─ load agent (re-read now)
//!                                          ├─ dispatch -> Outcome
//!                                          └─ finish RUNNING -> terminal (store CAS)
//! ```
//!
//! `run` never returns an error. A lost claim means another invocation owns
//! the experiment and nothing is written. After a won claim every fault ends
//! in one attempt to record FAILED; only if that write also fails does the
//! experiment stay RUNNING until `recover` on the next start.
//!
//! Creation never waits on the scheduler. A PENDING experiment whose trigger
//! was dropped on a full queue is picked up by the pending sweep.

use crate::events::ExperimentEvent;
use crate::scheduler::{RunExperiment, Scheduler};
use agentlab_core::config::ExecutionConfig;
use agentlab_core::{
    AgentId, Error, Experiment, ExperimentId, ExperimentStatus, Result, Terminal, UserId,
};
use agentlab_frameworks::Dispatcher;
use agentlab_store::Store;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const AGENT_NOT_FOUND: &str = "Agent not found";
pub const INTERRUPTED: &str = "Interrupted by restart";

const EVENT_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Runner - the execution half, driven by the scheduler
// ---------------------------------------------------------------------------

pub struct ExperimentRunner {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Sender<ExperimentEvent>,
}

impl ExperimentRunner {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<Dispatcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, dispatcher, events }
    }

    fn emit(&self, experiment: &Experiment) {
        // No subscribers is fine.
        let _ = self.events.send(ExperimentEvent::from_record(experiment));
    }

    /// Execute one experiment end to end.
    pub async fn execute(&self, id: ExperimentId) {
        let claimed = match self.store.claim_experiment(id, Utc::now()).await {
            Ok(Some(experiment)) => experiment,
            Ok(None) => {
                debug!("Experiment {} is no longer pending, skipping run", id);
                return;
            }
            Err(e) if e.is_not_found() => {
                warn!("Experiment {} not found at run time", id);
                return;
            }
            Err(e) => {
                error!("Failed to claim experiment {}: {}", id, e);
                // The claim may have landed before the fault.
                self.fail_best_effort(id, &e).await;
                return;
            }
        };
        self.emit(&claimed);
        info!("Experiment {} running (agent {})", id, claimed.agent_id);

        let terminal = match self.outcome_for(&claimed).await {
            Ok(terminal) => terminal,
            Err(e) => {
                error!("Experiment {} failed outside the adapter: {}", id, e);
                self.fail_best_effort(id, &e).await;
                return;
            }
        };

        match self.store.finish_experiment(id, terminal, Utc::now()).await {
            Ok(done) => {
                match &done.error {
                    Some(message) => info!("Experiment {} failed: {}", id, message),
                    None => info!("Experiment {} completed", id),
                }
                self.emit(&done);
            }
            Err(e @ Error::InvalidTransition { .. }) => {
                error!("Experiment {} changed under its run: {}", id, e);
            }
            Err(e) => {
                error!("Failed to record outcome for experiment {}: {}", id, e);
                self.fail_best_effort(id, &e).await;
            }
        }
    }

    /// Load the agent configuration as it is now and dispatch.
    async fn outcome_for(&self, experiment: &Experiment) -> Result<Terminal> {
        let Some(agent) = self.store.get_agent(experiment.agent_id).await? else {
            warn!(
                "Agent {} for experiment {} no longer exists",
                experiment.agent_id, experiment.id
            );
            return Ok(Terminal::Failed(AGENT_NOT_FOUND.to_string()));
        };
        debug!("Experiment {} dispatching to {}", experiment.id, agent.framework);
        let outcome = self
            .dispatcher
            .dispatch(agent.framework, &agent.config, &experiment.input_data)
            .await;
        Ok(outcome.into_terminal())
    }

    async fn fail_best_effort(&self, id: ExperimentId, fault: &Error) {
        let terminal = Terminal::Failed(format!("Internal error: {}", fault));
        match self.store.finish_experiment(id, terminal, Utc::now()).await {
            Ok(done) => self.emit(&done),
            Err(e) => error!(
                "Could not mark experiment {} failed ({}); left for recovery",
                id, e
            ),
        }
    }
}

#[async_trait::async_trait]
impl RunExperiment for ExperimentRunner {
    async fn run(&self, id: ExperimentId) {
        self.execute(id).await
    }
}

// ---------------------------------------------------------------------------
// Manager - the outward-facing operations
// ---------------------------------------------------------------------------

/// Result of a startup recovery pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// RUNNING experiments marked FAILED.
    pub failed: usize,
    /// PENDING experiments queued again.
    pub rescheduled: usize,
}

pub struct ExperimentManager {
    store: Arc<dyn Store>,
    runner: Arc<ExperimentRunner>,
    scheduler: Arc<Scheduler>,
}

impl ExperimentManager {
    /// Build the manager and start its scheduler and pending sweep. Needs a
    /// tokio runtime.
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<Dispatcher>, execution: &ExecutionConfig) -> Self {
        let runner = Arc::new(ExperimentRunner::new(store.clone(), dispatcher));
        let scheduler = Arc::new(Scheduler::start(runner.clone(), execution));
        if let Some(every) = execution.pending_sweep() {
            tokio::spawn(sweep_pending(store.clone(), scheduler.clone(), every));
        }
        Self { store, runner, scheduler }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.runner.events.subscribe()
    }

    /// Persist a PENDING experiment for an agent owned by `owner` and schedule
    /// it. Returns without waiting for execution.
    pub async fn create(
        &self,
        owner: UserId,
        agent_id: AgentId,
        input_data: Value,
    ) -> Result<Experiment> {
        let input_data = match input_data {
            Value::Null => agentlab_core::empty_object(),
            Value::Object(_) => input_data,
            _ => return Err(Error::validation("input_data must be an object")),
        };
        if self.store.get_owned_agent(agent_id, owner).await?.is_none() {
            return Err(Error::AgentNotFound(agent_id));
        }

        let experiment = self
            .store
            .insert_experiment(agent_id, owner, input_data, Utc::now())
            .await?;
        self.runner.emit(&experiment);
        info!("Experiment {} created for agent {}", experiment.id, agent_id);

        if !self.scheduler.schedule(experiment.id) {
            debug!("Experiment {} created but not queued, left for the sweep", experiment.id);
        }
        Ok(experiment)
    }

    /// Trigger execution. Duplicate triggers while queued or running are
    /// dropped, as is a trigger that finds the queue full; a trigger after
    /// termination runs but changes nothing.
    pub fn schedule(&self, id: ExperimentId) -> bool {
        self.scheduler.schedule(id)
    }

    /// Run inline on the caller's task, bypassing the queue.
    pub async fn run(&self, id: ExperimentId) {
        self.runner.execute(id).await
    }

    pub async fn get(&self, owner: UserId, id: ExperimentId) -> Result<Experiment> {
        self.store
            .get_owned_experiment(id, owner)
            .await?
            .ok_or(Error::ExperimentNotFound(id))
    }

    pub async fn get_status(&self, owner: UserId, id: ExperimentId) -> Result<ExperimentStatus> {
        Ok(self.get(owner, id).await?.status)
    }

    /// The full record once terminal; `NotReady` while PENDING or RUNNING.
    pub async fn get_result(&self, owner: UserId, id: ExperimentId) -> Result<Experiment> {
        let experiment = self.get(owner, id).await?;
        if !experiment.status.is_terminal() {
            return Err(Error::NotReady { id, status: experiment.status });
        }
        Ok(experiment)
    }

    /// Experiments owned by `owner`, oldest first.
    pub async fn list(&self, owner: UserId) -> Result<Vec<Experiment>> {
        self.store.list_experiments(owner).await
    }

    /// Startup pass: a RUNNING experiment was interrupted mid-call and cannot
    /// be re-run, so it is failed; PENDING ones are queued again.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for experiment in self.store.list_experiments_by_status(ExperimentStatus::Running).await? {
            let terminal = Terminal::Failed(INTERRUPTED.to_string());
            match self.store.finish_experiment(experiment.id, terminal, Utc::now()).await {
                Ok(done) => {
                    report.failed += 1;
                    self.runner.emit(&done);
                }
                Err(e) => warn!("Could not fail interrupted experiment {}: {}", experiment.id, e),
            }
        }

        report.rescheduled = requeue_pending(self.store.as_ref(), &self.scheduler).await?;

        if report != RecoveryReport::default() {
            info!(
                "Recovery: {} interrupted experiments failed, {} rescheduled",
                report.failed, report.rescheduled
            );
        }
        Ok(report)
    }

    /// Stop scheduling and wait for running experiments.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight_count()
    }
}

/// Offer every PENDING experiment to the scheduler. Ids already queued or
/// running are dropped by the scheduler's dedupe.
async fn requeue_pending(store: &dyn Store, scheduler: &Scheduler) -> Result<usize> {
    let mut queued = 0;
    for experiment in store.list_experiments_by_status(ExperimentStatus::Pending).await? {
        if scheduler.schedule(experiment.id) {
            queued += 1;
        }
    }
    Ok(queued)
}

async fn sweep_pending(store: Arc<dyn Store>, scheduler: Arc<Scheduler>, every: Duration) {
    let stop = scheduler.stop_token();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; startup is covered by `recover`.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match requeue_pending(store.as_ref(), &scheduler).await {
            Ok(0) => {}
            Ok(n) => debug!("Pending sweep queued {} experiments", n),
            Err(e) => warn!("Pending sweep failed: {}", e),
        }
    }
}
