//! Agentlab Engine - experiment lifecycle, scheduling, and recovery
//!
//! `ExperimentManager` is the only writer of experiment status after
//! creation. Execution is handed to the `Scheduler`, which runs each
//! experiment id at most once at a time; the store's claim makes that once
//! per lifetime.

pub mod events;
pub mod lifecycle;
pub mod scheduler;

pub use events::ExperimentEvent;
pub use lifecycle::{ExperimentManager, ExperimentRunner, RecoveryReport};
pub use scheduler::{RunExperiment, Scheduler};
