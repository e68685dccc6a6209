//! Agentlab Gateway - HTTP API over the agent registry and experiment engine

pub mod accounts;
pub mod agents;
pub mod auth;
pub mod error;
pub mod experiments;
pub mod extract;
pub mod password;
pub mod server;

pub use server::{router, serve, start_server, AppState};
