//! Chain RPC and price-oracle ports (Ports in Hexagonal Architecture).
//!
//! `CHAIN` and `ORACLE` are external collaborators per spec §1 — this module
//! defines only the interface the core depends on. No production
//! implementation ships here; callers supply one (a JSON-RPC client, a
//! Geyser-style stream, whatever fits their chain).

use crate::core::error::IndexerResult;
use crate::core::types::{Address, BlockNumber, RawEvent};
use async_trait::async_trait;

/// A request for a bounded block range of events, optionally narrowed to a
/// set of emitter addresses (the registry plus any tracked agents).
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub from_block: BlockNumber,
    pub to_block: BlockNumber,
    pub addresses: Vec<Address>,
}

/// The chain RPC surface the watcher and the on-demand fetch paths need.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head.
    async fn block_number(&self) -> IndexerResult<BlockNumber>;

    /// Events in `[filter.from_block, filter.to_block]` matching `filter.addresses`.
    /// Returned undecoded: the watcher classifies each one by selector.
    async fn events(&self, filter: EventFilter) -> IndexerResult<Vec<RawEvent>>;

    /// Direct contract read at the "latest" tag, used by the on-demand
    /// agent-fetch path (`is_agent_registered`, `get_name`, ...).
    async fn call(&self, contract: Address, selector: &str, calldata: &[u8]) -> IndexerResult<Vec<u8>>;

    /// Current ERC20 balance of `owner` for `token`, used by the balance
    /// refresh task.
    async fn erc20_balance_of(&self, token: Address, owner: Address) -> IndexerResult<u128>;
}

/// The price-oracle surface `TokenIndexer`'s refresh task depends on.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD per smallest-token-unit, scaled by 10^18.
    async fn get_rate(&self, token: Address) -> IndexerResult<u128>;
}
