//! HTTP response DTOs (spec §6). Wide (128-bit) on-chain amounts are
//! serialized as decimal strings so they survive a JSON `Number` round-trip
//! through clients that parse into a 64-bit float.

use crate::core::types::Address;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WideInt(pub u128);

impl Serialize for WideInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl From<u128> for WideInt {
    fn from(v: u128) -> Self {
        WideInt(v)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestPromptResponse {
    pub prompt: String,
    pub is_success: bool,
    pub drained_to: Address,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentData {
    pub pending: bool,
    pub address: Address,
    pub token: Address,
    pub name: String,
    pub balance: WideInt,
    pub end_time: i64,
    pub is_drained: bool,
    pub is_finalized: bool,
    pub prompt_price: WideInt,
    pub break_attempts: u64,
    pub latest_prompts: Vec<LatestPromptResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentPageResponse {
    pub agents: Vec<AgentData>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub last_block: u64,
}
