//! The four event-driven projections (spec §4.B-§4.E).

pub mod agent;
pub mod balance;
pub mod token;
pub mod usage;

pub use agent::AgentIndexer;
pub use balance::{AgentBalanceIndexer, DEFAULT_WORKER_POOL_SIZE};
pub use token::TokenIndexer;
pub use usage::AgentUsageIndexer;
