//! Core domain abstractions: types, errors, and the chain/oracle ports.
//!
//! Independent of any specific infrastructure concern — the watcher, the
//! projections, and the query layer all build on this module without
//! depending on each other directly.

pub mod chain;
pub mod error;
pub mod types;

pub use chain::{ChainClient, EventFilter, PriceOracle};
pub use error::{ChainError, IndexerError, IndexerResult};
pub use types::*;
