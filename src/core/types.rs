//! Core domain types shared by the watcher, the projections, and the query layer.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte on-chain address. Wraps the raw bytes so the rest of the crate
/// never has to think about hex encoding/decoding directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub B256);

impl Address {
    pub const ZERO: Address = Address(B256::ZERO);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref()
    }

    /// Explicit hex encoding, `0x`-prefixed, lowercase. The one and only
    /// canonical string form of an address — never format an address with
    /// `{:?}` when a stable key or cache lookup is needed.
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = alloy_primitives::hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Address(s.parse::<B256>()?))
    }
}

/// A cached address paired with its hex-string form, per spec's `AgentRef`:
/// avoids re-deriving the hex encoding on every lookup/response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub address: Address,
    pub hex: String,
}

impl From<Address> for AgentRef {
    fn from(address: Address) -> Self {
        let hex = address.to_hex();
        Self { address, hex }
    }
}

/// Monotone watermark: highest block whose events have been fully applied.
pub type BlockNumber = u64;

/// The closed set of event kinds the watcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    AgentRegistered,
    PromptPaid,
    PromptConsumed,
    TokenAdded,
    TokenRemoved,
    Transfer,
    TeeUnencumbered,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::AgentRegistered,
        EventKind::PromptPaid,
        EventKind::PromptConsumed,
        EventKind::TokenAdded,
        EventKind::TokenRemoved,
        EventKind::Transfer,
        EventKind::TeeUnencumbered,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::AgentRegistered => "AgentRegistered",
            EventKind::PromptPaid => "PromptPaid",
            EventKind::PromptConsumed => "PromptConsumed",
            EventKind::TokenAdded => "TokenAdded",
            EventKind::TokenRemoved => "TokenRemoved",
            EventKind::Transfer => "Transfer",
            EventKind::TeeUnencumbered => "TeeUnencumbered",
        };
        write!(f, "{s}")
    }
}

/// A selector: a hash identifying an event kind, per spec's ABI glossary
/// entry. The watcher's classification step looks this up against a fixed
/// table to decide how to decode `RawEvent::data`.
pub type Selector = B256;

/// An event as it comes off the chain, before classification: the selector
/// and emitter are known, but the payload is still opaque bytes. Decoding
/// this into a [`ChainEvent`] is the watcher's classification step (spec
/// §4.A step 5) — a failure here skips the one event, not the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub block: BlockNumber,
    pub log_index: u64,
    pub emitter: Address,
    pub selector: Selector,
    pub data: Vec<u8>,
}

/// A single decoded chain event, tagged with the block/emitter it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub block: BlockNumber,
    /// Index of this event within its block; used for the
    /// `(toBlock, index-within-batch)` per-subscriber ordering guarantee.
    pub log_index: u64,
    /// Address that emitted the event (the contract, not a `from`/`to` field).
    pub emitter: Address,
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    AgentRegistered(AgentRegistered),
    PromptPaid(PromptPaid),
    PromptConsumed(PromptConsumed),
    TokenAdded(TokenAdded),
    TokenRemoved(TokenRemoved),
    Transfer(Transfer),
    TeeUnencumbered(TeeUnencumbered),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::AgentRegistered(_) => EventKind::AgentRegistered,
            EventPayload::PromptPaid(_) => EventKind::PromptPaid,
            EventPayload::PromptConsumed(_) => EventKind::PromptConsumed,
            EventPayload::TokenAdded(_) => EventKind::TokenAdded,
            EventPayload::TokenRemoved(_) => EventKind::TokenRemoved,
            EventPayload::Transfer(_) => EventKind::Transfer,
            EventPayload::TeeUnencumbered(_) => EventKind::TeeUnencumbered,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistered {
    pub address: Address,
    pub creator: Address,
    pub name: String,
    pub system_prompt: String,
    pub prompt_price: u128,
    pub token_address: Address,
    pub end_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPaid {
    pub agent: Address,
    pub prompt_id: u64,
    pub tweet_id: u64,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConsumed {
    pub agent: Address,
    pub prompt_id: u64,
    pub drained_to: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAdded {
    pub token: Address,
    pub min_prompt_price: u128,
    pub min_initial_balance: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRemoved {
    pub token: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeeUnencumbered {
    pub agent: Address,
}

/// An agent's immutable registration record. Created on `AgentRegistered`,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub address: Address,
    pub creator: Address,
    pub name: String,
    pub system_prompt: String,
    pub prompt_price: u128,
    pub token_address: Address,
    pub end_time: i64,
    pub registered_at_block: BlockNumber,
}

/// Per-token state: pricing floors plus the last observed USD rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub min_prompt_price: u128,
    pub min_initial_balance: u128,
    /// USD per smallest-token-unit, scaled by 10^18. `None` until the first
    /// successful oracle refresh.
    pub rate: Option<u128>,
    pub rate_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Set by `TokenRemoved`: the token no longer qualifies for new
    /// registrations, but its last-known rate is preserved.
    pub removed: bool,
}

impl TokenInfo {
    pub fn new(min_prompt_price: u128, min_initial_balance: u128) -> Self {
        Self {
            min_prompt_price,
            min_initial_balance,
            rate: None,
            rate_time: None,
            removed: false,
        }
    }
}

/// A projection's view of one agent's ERC20 balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBalance {
    pub token: Address,
    pub amount: u128,
    pub end_time: i64,
    /// True until the first successful on-chain balance read.
    pub pending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentUsageLatestPrompt {
    pub prompt_id: u64,
    pub tweet_id: u64,
    pub prompt: String,
    pub is_success: bool,
    pub drained_to: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentUsage {
    pub break_attempts: u64,
    pub is_drained: bool,
    pub latest_prompts: std::collections::VecDeque<AgentUsageLatestPrompt>,
}

/// A single row of the USD leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub agent_address: Address,
    pub usd_value: u128,
    pub end_time: i64,
    pub is_active: bool,
}

/// Ordering per spec §3: `usdValue` desc, then `endTime` asc, then address asc.
impl Ord for LeaderboardEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .usd_value
            .cmp(&self.usd_value)
            .then_with(|| self.end_time.cmp(&other.end_time))
            .then_with(|| self.agent_address.cmp(&other.agent_address))
    }
}

impl PartialOrd for LeaderboardEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A page of results plus the watermark it was computed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub last_block: BlockNumber,
}
