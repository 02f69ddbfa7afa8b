//! Event-driven indexing core for on-chain agent contracts.
//!
//! Pulls typed events from a chain node, fans them out to four in-memory
//! projections (supported tokens, agent registrations, agent usage, agent
//! balances), and serves a small read-only HTTP query surface over them.

pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod indexers;
pub mod query;
pub mod supervisor;
pub mod watcher;

pub mod testing;

pub use config::IndexerConfig;
pub use core::{Address, ChainClient, IndexerError, IndexerResult, PriceOracle};
pub use supervisor::Supervisor;
