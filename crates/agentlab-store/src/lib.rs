//! Agentlab Store - the relational store collaborator and its in-memory implementation

pub mod memory;
pub mod snapshot;
pub mod store;

pub use memory::MemoryStore;
pub use store::Store;
