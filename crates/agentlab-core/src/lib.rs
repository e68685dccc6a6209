//! Agentlab Core - Records, outcomes, settings, and error handling

pub mod config;
pub mod error;
pub mod experiment;
pub mod outcome;
pub mod types;

pub use config::Settings;
pub use error::{Error, Result};
pub use experiment::{Experiment, ExperimentStatus, Terminal};
pub use outcome::Outcome;
pub use types::*;
