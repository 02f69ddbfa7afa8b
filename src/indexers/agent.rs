//! `AgentIndexer`: tracks agent registrations, plus the creator and
//! name-prefix indexes, plus the on-demand backfill path (spec §4.C).

use crate::core::chain::ChainClient;
use crate::core::error::{IndexerError, IndexerResult};
use crate::core::types::{Address, AgentInfo, BlockNumber, EventPayload, Page};
use crate::watcher::EventBatch;
use std::collections::HashMap;
use std::sync::RwLock;

struct State {
    by_address: HashMap<Address, AgentInfo>,
    by_creator: HashMap<Address, Vec<Address>>,
    /// Sorted by `(name, address)` so a prefix query is a binary search to
    /// the lower bound followed by a linear walk (spec §4.C).
    by_name: Vec<(String, Address)>,
    last_indexed_block: BlockNumber,
}

pub struct AgentIndexer {
    state: RwLock<State>,
}

impl Default for AgentIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentIndexer {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                by_address: HashMap::new(),
                by_creator: HashMap::new(),
                by_name: Vec::new(),
                last_indexed_block: 0,
            }),
        }
    }

    fn on_agent_registered(&self, state: &mut State, info: AgentInfo) {
        if state.by_address.contains_key(&info.address) {
            return;
        }
        state.by_creator.entry(info.creator).or_default().push(info.address);
        let pos = state
            .by_name
            .partition_point(|(name, addr)| (name.as_str(), *addr) < (info.name.as_str(), info.address));
        state.by_name.insert(pos, (info.name.clone(), info.address));
        state.by_address.insert(info.address, info);
    }

    pub fn apply_batch(&self, batch: &EventBatch) {
        let mut state = self.state.write().expect("agent indexer lock poisoned");
        for event in &batch.events {
            if let EventPayload::AgentRegistered(e) = &event.payload {
                let info = AgentInfo {
                    address: e.address,
                    creator: e.creator,
                    name: e.name.clone(),
                    system_prompt: e.system_prompt.clone(),
                    prompt_price: e.prompt_price,
                    token_address: e.token_address,
                    end_time: e.end_time,
                    registered_at_block: event.block,
                };
                self.on_agent_registered(&mut state, info);
            }
        }
        if batch.to_block > state.last_indexed_block {
            state.last_indexed_block = batch.to_block;
        }
    }

    pub fn get_agent_info(&self, address: Address) -> Option<AgentInfo> {
        self.state
            .read()
            .expect("agent indexer lock poisoned")
            .by_address
            .get(&address)
            .cloned()
    }

    pub fn last_indexed_block(&self) -> BlockNumber {
        self.state.read().expect("agent indexer lock poisoned").last_indexed_block
    }

    /// Returns `None` when `start` is past the end of the creator's agent
    /// list — out-of-range is distinct from an empty page (spec §4.C).
    pub fn get_agents_by_creator(&self, creator: Address, start: usize, limit: usize) -> Option<Page<Address>> {
        let state = self.state.read().expect("agent indexer lock poisoned");
        let agents = state.by_creator.get(&creator).map(Vec::as_slice).unwrap_or(&[]);
        page_of(agents, start, limit, state.last_indexed_block)
    }

    pub fn get_agent_infos_by_name_prefix(&self, prefix: &str, start: usize, limit: usize) -> Option<Page<AgentInfo>> {
        let state = self.state.read().expect("agent indexer lock poisoned");
        let lower = state.by_name.partition_point(|(name, _)| name.as_str() < prefix);
        let upper = state.by_name[lower..]
            .iter()
            .take_while(|(name, _)| name.starts_with(prefix))
            .count()
            + lower;
        let matches: Vec<Address> = state.by_name[lower..upper].iter().map(|(_, addr)| *addr).collect();
        let page = page_of(&matches, start, limit, state.last_indexed_block)?;
        Some(Page {
            items: page
                .items
                .into_iter()
                .filter_map(|addr| state.by_address.get(&addr).cloned())
                .collect(),
            total: page.total,
            last_block: page.last_block,
        })
    }

    /// Cached lookup first; otherwise, if the watermark has already passed
    /// `block`, the agent is considered non-existent. If the watermark
    /// hasn't caught up yet, fall through to a direct RPC read so backfill
    /// queries don't see false negatives (spec §4.C).
    pub async fn get_or_fetch_agent_info<C: ChainClient>(
        &self,
        chain: &C,
        address: Address,
        block: BlockNumber,
    ) -> IndexerResult<AgentInfo> {
        if let Some(info) = self.get_agent_info(address) {
            return Ok(info);
        }
        if self.last_indexed_block() >= block {
            return Err(IndexerError::AgentNotFound {
                address: address.to_hex(),
            });
        }
        fetch_agent_info(chain, address, block).await
    }
}

fn page_of<T: Clone>(items: &[T], start: usize, limit: usize, last_block: BlockNumber) -> Option<Page<T>> {
    if start > items.len() {
        return None;
    }
    let end = (start + limit).min(items.len());
    Some(Page {
        items: items[start..end].to_vec(),
        total: items.len(),
        last_block,
    })
}

async fn fetch_agent_info<C: ChainClient>(chain: &C, address: Address, block: BlockNumber) -> IndexerResult<AgentInfo> {
    let registered = chain.call(address, "is_agent_registered", &[]).await?;
    if registered.first().copied().unwrap_or(0) == 0 {
        return Err(IndexerError::AgentNotFound {
            address: address.to_hex(),
        });
    }
    let name = decode_string(chain.call(address, "get_name", &[]).await?);
    let system_prompt = decode_string(chain.call(address, "get_system_prompt", &[]).await?);
    let creator = decode_address(chain.call(address, "get_creator", &[]).await?);
    let token_address = decode_address(chain.call(address, "get_token_address", &[]).await?);
    let prompt_price = decode_u128(chain.call(address, "get_prompt_price", &[]).await?);
    let end_time = decode_u128(chain.call(address, "get_end_time", &[]).await?) as i64;

    Ok(AgentInfo {
        address,
        creator,
        name,
        system_prompt,
        prompt_price,
        token_address,
        end_time,
        // The exact registration block isn't retrievable through this
        // narrow RPC surface; the query block is the tightest bound we have.
        registered_at_block: block,
    })
}

fn decode_string(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string()
}

fn decode_address(bytes: Vec<u8>) -> Address {
    let mut buf = [0u8; 32];
    let n = bytes.len().min(32);
    buf[32 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    Address::from_bytes(buf)
}

fn decode_u128(bytes: Vec<u8>) -> u128 {
    let mut buf = [0u8; 16];
    let n = bytes.len().min(16);
    buf[16 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    u128::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentRegistered, ChainEvent};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn registered_batch(name: &str, address: Address, creator: Address, block: BlockNumber) -> EventBatch {
        EventBatch {
            events: vec![ChainEvent {
                block,
                log_index: 0,
                emitter: addr(0xAA),
                payload: EventPayload::AgentRegistered(AgentRegistered {
                    address,
                    creator,
                    name: name.to_string(),
                    system_prompt: "sp".into(),
                    prompt_price: 100,
                    token_address: addr(0xEE),
                    end_time: 2000,
                }),
            }],
            from_block: block,
            to_block: block,
        }
    }

    #[test]
    fn registration_populates_all_three_indexes() {
        let idx = AgentIndexer::new();
        idx.apply_batch(&registered_batch("alice", addr(1), addr(9), 10));
        assert_eq!(idx.get_agent_info(addr(1)).unwrap().name, "alice");
        assert_eq!(idx.last_indexed_block(), 10);
        let by_creator = idx.get_agents_by_creator(addr(9), 0, 10).unwrap();
        assert_eq!(by_creator.items, vec![addr(1)]);
        let by_name = idx.get_agent_infos_by_name_prefix("al", 0, 10).unwrap();
        assert_eq!(by_name.items.len(), 1);
    }

    #[test]
    fn out_of_range_start_is_not_found() {
        let idx = AgentIndexer::new();
        idx.apply_batch(&registered_batch("alice", addr(1), addr(9), 10));
        assert!(idx.get_agents_by_creator(addr(9), 5, 10).is_none());
    }

    #[test]
    fn name_prefix_is_case_sensitive_and_tie_broken_by_address() {
        let idx = AgentIndexer::new();
        idx.apply_batch(&registered_batch("bob", addr(2), addr(9), 10));
        idx.apply_batch(&registered_batch("Bob", addr(3), addr(9), 11));
        let page = idx.get_agent_infos_by_name_prefix("bob", 0, 10).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].address, addr(2));
    }
}
