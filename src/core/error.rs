//! Centralized error types for the indexer core.

use thiserror::Error;

/// Top-level indexer error type.
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("chain RPC error: {0}")]
    Chain(#[from] ChainError),

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("event payload failed to parse against the expected ABI: {0}")]
    Protocol(String),

    #[error("event emitted from an unexpected address: {0}")]
    Spoofed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("agent not found: {address}")]
    AgentNotFound { address: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Chain-RPC-specific errors, the "transient upstream" class from spec §7.1.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("RPC call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        IndexerError::Protocol(err.to_string())
    }
}
