//! Scheduler - single-consumer run queue with per-id deduplication
//!
//! Every trigger enters one `mpsc` queue. The consumer loop spawns one task
//! per id, bounded by a semaphore. An id stays in the in-flight set from the
//! moment it is queued until its run returns, and a trigger for an id that
//! is already in flight is dropped. The store claim makes a later trigger
//! for a finished experiment a no-op.
//!
//! `schedule` never waits. When the queue is full the trigger is dropped and
//! the experiment stays PENDING until the manager's pending sweep offers it
//! again.

use agentlab_core::config::ExecutionConfig;
use agentlab_core::ExperimentId;
use dashmap::DashSet;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The unit of work the scheduler runs. Must not fail; faults are handled
/// (and logged) inside `run`.
#[async_trait::async_trait]
pub trait RunExperiment: Send + Sync {
    async fn run(&self, id: ExperimentId);
}

pub struct Scheduler {
    queue_tx: mpsc::Sender<ExperimentId>,
    in_flight: Arc<DashSet<ExperimentId>>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Spawn the consumer loop. Must be called inside a tokio runtime.
    pub fn start(runner: Arc<dyn RunExperiment>, config: &ExecutionConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let in_flight = Arc::new(DashSet::new());
        let max_concurrent = config.max_concurrent_runs.max(1);
        let permits = Arc::new(Semaphore::new(max_concurrent));
        let shutdown = CancellationToken::new();

        let consumer = SchedulerLoop {
            queue_rx,
            runner,
            in_flight: in_flight.clone(),
            permits: permits.clone(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(consumer.run());

        Self { queue_tx, in_flight, permits, max_concurrent, shutdown }
    }

    /// Queue `id` for execution without waiting. Returns false when the
    /// trigger was dropped: the id is already queued or running, the queue
    /// is full, or the scheduler is stopped.
    pub fn schedule(&self, id: ExperimentId) -> bool {
        if self.shutdown.is_cancelled() {
            warn!("Scheduler stopped, dropping experiment {}", id);
            return false;
        }
        if !self.in_flight.insert(id) {
            debug!("Experiment {} already in flight, trigger dropped", id);
            return false;
        }
        match self.queue_tx.try_send(id) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.in_flight.remove(&id);
                warn!("Scheduler queue full, experiment {} stays pending", id);
                return false;
            }
            Err(TrySendError::Closed(_)) => {
                self.in_flight.remove(&id);
                warn!("Scheduler queue closed, dropping experiment {}", id);
                return false;
            }
        }
        debug!("Experiment {} scheduled", id);
        true
    }

    pub fn is_in_flight(&self, id: ExperimentId) -> bool {
        self.in_flight.contains(&id)
    }

    /// Ids queued or running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Stop accepting work and wait for running experiments to return.
    /// Queued but unstarted ids stay PENDING and are picked up by recovery
    /// on the next start.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        match self.permits.acquire_many(self.max_concurrent as u32).await {
            Ok(_all) => info!("Scheduler drained"),
            Err(_) => warn!("Scheduler semaphore closed before drain"),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancelled once `shutdown` starts.
    pub fn stop_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

struct SchedulerLoop {
    queue_rx: mpsc::Receiver<ExperimentId>,
    runner: Arc<dyn RunExperiment>,
    in_flight: Arc<DashSet<ExperimentId>>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl SchedulerLoop {
    async fn run(mut self) {
        info!("Scheduler started");
        loop {
            let id = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = self.queue_rx.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let runner = self.runner.clone();
            let in_flight = self.in_flight.clone();
            tokio::spawn(async move {
                if AssertUnwindSafe(runner.run(id)).catch_unwind().await.is_err() {
                    error!("Run for experiment {} panicked", id);
                }
                in_flight.remove(&id);
                drop(permit);
            });
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl RunExperiment for Counting {
        async fn run(&self, _id: ExperimentId) {
            tokio::time::sleep(self.delay).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_idle(scheduler: &Scheduler) {
        for _ in 0..200 {
            if scheduler.in_flight_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scheduler never went idle");
    }

    #[tokio::test]
    async fn duplicate_trigger_while_in_flight_is_dropped() {
        let runner = Arc::new(Counting { calls: AtomicUsize::new(0), delay: Duration::from_millis(50) });
        let scheduler = Scheduler::start(runner.clone(), &ExecutionConfig::default());

        assert!(scheduler.schedule(ExperimentId(1)));
        assert!(!scheduler.schedule(ExperimentId(1)));
        assert!(scheduler.is_in_flight(ExperimentId(1)));
        wait_idle(&scheduler).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

        // Once finished the id may be triggered again.
        assert!(scheduler.schedule(ExperimentId(1)));
        wait_idle(&scheduler).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_trigger_without_waiting() {
        let runner = Arc::new(Counting { calls: AtomicUsize::new(0), delay: Duration::from_millis(200) });
        let config = ExecutionConfig { max_concurrent_runs: 1, queue_capacity: 1, ..Default::default() };
        let scheduler = Scheduler::start(runner.clone(), &config);

        // One running, one held by the loop waiting for a permit, one queued.
        assert!(scheduler.schedule(ExperimentId(1)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scheduler.schedule(ExperimentId(2)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scheduler.schedule(ExperimentId(3)));

        assert!(!scheduler.schedule(ExperimentId(4)));
        assert!(!scheduler.is_in_flight(ExperimentId(4)));

        for _ in 0..300 {
            if scheduler.in_flight_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        assert!(scheduler.schedule(ExperimentId(4)));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let runner = Arc::new(Counting { calls: AtomicUsize::new(0), delay: Duration::ZERO });
        let scheduler = Scheduler::start(runner, &ExecutionConfig::default());
        scheduler.shutdown().await;
        assert!(scheduler.is_shut_down());
        assert!(!scheduler.schedule(ExperimentId(7)));
        assert_eq!(scheduler.in_flight_count(), 0);
    }
}
