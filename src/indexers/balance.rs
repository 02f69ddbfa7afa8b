//! `AgentBalanceIndexer`: tracks ERC20 balances per agent and maintains the
//! USD leaderboard (spec §4.E) — the most complex projection.

use crate::core::chain::ChainClient;
use crate::core::types::{Address, AgentBalance, BlockNumber, EventPayload, LeaderboardEntry, Page};
use crate::indexers::token::TokenIndexer;
use crate::watcher::EventBatch;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_WORKER_POOL_SIZE: usize = 16;

struct State {
    agent_token: HashMap<Address, Address>,
    end_times: HashMap<Address, i64>,
    balances: HashMap<Address, AgentBalance>,
    dirty: HashSet<Address>,
    last_indexed_block: BlockNumber,
}

pub struct AgentBalanceIndexer {
    state: RwLock<State>,
}

impl Default for AgentBalanceIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBalanceIndexer {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                agent_token: HashMap::new(),
                end_times: HashMap::new(),
                balances: HashMap::new(),
                dirty: HashSet::new(),
                last_indexed_block: 0,
            }),
        }
    }

    fn on_agent_registered(&self, state: &mut State, agent: Address, token: Address, end_time: i64) {
        if state.agent_token.contains_key(&agent) {
            return;
        }
        state.agent_token.insert(agent, token);
        state.end_times.insert(agent, end_time);
        state.balances.insert(
            agent,
            AgentBalance {
                token,
                amount: 0,
                end_time,
                pending: true,
            },
        );
        state.dirty.insert(agent);
    }

    fn on_transfer(&self, state: &mut State, token: Address, from: Address, to: Address) {
        for addr in [from, to] {
            if state.agent_token.get(&addr) == Some(&token) {
                state.dirty.insert(addr);
            }
        }
    }

    pub fn apply_batch(&self, batch: &EventBatch) {
        let mut state = self.state.write().expect("balance indexer lock poisoned");
        for event in &batch.events {
            match &event.payload {
                EventPayload::AgentRegistered(e) => {
                    self.on_agent_registered(&mut state, e.address, e.token_address, e.end_time)
                }
                EventPayload::Transfer(e) => self.on_transfer(&mut state, e.token, e.from, e.to),
                _ => {}
            }
        }
        if batch.to_block > state.last_indexed_block {
            state.last_indexed_block = batch.to_block;
        }
    }

    pub fn get_balance(&self, agent: Address) -> Option<AgentBalance> {
        self.state
            .read()
            .expect("balance indexer lock poisoned")
            .balances
            .get(&agent)
            .cloned()
    }

    pub fn last_indexed_block(&self) -> BlockNumber {
        self.state.read().expect("balance indexer lock poisoned").last_indexed_block
    }

    fn snapshot_dirty(&self) -> Vec<(Address, Address)> {
        let mut state = self.state.write().expect("balance indexer lock poisoned");
        let dirty: Vec<Address> = state.dirty.drain().collect();
        dirty
            .into_iter()
            .filter_map(|agent| state.agent_token.get(&agent).map(|token| (agent, *token)))
            .collect()
    }

    fn commit_balance(&self, agent: Address, amount: u128) {
        let mut state = self.state.write().expect("balance indexer lock poisoned");
        if let Some(entry) = state.balances.get_mut(&agent) {
            entry.amount = amount;
            entry.pending = false;
        }
    }

    /// Snapshots the dirty set, reads balances concurrently (bounded worker
    /// pool), and commits. Never holds the lock across the RPC call (spec §5).
    pub async fn run_balance_refresh<C: ChainClient>(
        &self,
        chain: std::sync::Arc<C>,
        tick_rate: Duration,
        worker_pool_size: usize,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(tick_rate) => {}
            }

            let dirty = self.snapshot_dirty();
            if dirty.is_empty() {
                continue;
            }
            let count = dirty.len();
            stream::iter(dirty)
                .for_each_concurrent(worker_pool_size.max(1), |(agent, token)| {
                    let chain = chain.clone();
                    async move {
                        match chain.erc20_balance_of(token, agent).await {
                            Ok(amount) => self.commit_balance(agent, amount),
                            Err(e) => warn!(agent = %agent, error = %e, "balance refresh failed"),
                        }
                    }
                })
                .await;
            info!(count, "balance refresh tick complete");
        }
    }

    /// Returns the `[start, end)` slice of the USD-sorted snapshot. Agents
    /// with an unknown rate sort below every agent with a known rate,
    /// regardless of balance (spec §4.E).
    pub fn get_agent_leaderboard(&self, start: usize, end: usize, tokens: &TokenIndexer) -> Page<LeaderboardEntry> {
        let now = chrono::Utc::now().timestamp();
        let state = self.state.read().expect("balance indexer lock poisoned");

        let mut known: Vec<LeaderboardEntry> = Vec::new();
        let mut unknown: Vec<LeaderboardEntry> = Vec::new();

        for (agent, balance) in state.balances.iter() {
            let is_active = !balance.pending && now <= balance.end_time;
            match tokens.get_token_rate(balance.token) {
                Some(rate) => {
                    let usd_value = balance.amount.saturating_mul(rate) / 1_000_000_000_000_000_000u128;
                    known.push(LeaderboardEntry {
                        agent_address: *agent,
                        usd_value,
                        end_time: balance.end_time,
                        is_active,
                    });
                }
                None => unknown.push(LeaderboardEntry {
                    agent_address: *agent,
                    usd_value: 0,
                    end_time: balance.end_time,
                    is_active,
                }),
            }
        }

        known.sort();
        unknown.sort_by(|a, b| a.agent_address.cmp(&b.agent_address));

        let total = known.len() + unknown.len();
        let start = start.min(total);
        let end = end.clamp(start, total);
        let combined: Vec<LeaderboardEntry> = known.into_iter().chain(unknown).collect();

        Page {
            items: combined[start..end].to_vec(),
            total,
            last_block: state.last_indexed_block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentRegistered, ChainEvent, Transfer};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn batch(events: Vec<EventPayload>, block: BlockNumber) -> EventBatch {
        EventBatch {
            events: events
                .into_iter()
                .map(|payload| ChainEvent {
                    block,
                    log_index: 0,
                    emitter: addr(0xAA),
                    payload,
                })
                .collect(),
            from_block: block,
            to_block: block,
        }
    }

    #[test]
    fn registration_creates_a_pending_balance_row() {
        let idx = AgentBalanceIndexer::new();
        idx.apply_batch(&batch(
            vec![EventPayload::AgentRegistered(AgentRegistered {
                address: addr(1),
                creator: addr(9),
                name: "a".into(),
                system_prompt: "s".into(),
                prompt_price: 1,
                token_address: addr(0xEE),
                end_time: 2000,
            })],
            10,
        ));
        let balance = idx.get_balance(addr(1)).unwrap();
        assert!(balance.pending);
        assert_eq!(balance.amount, 0);
    }

    #[test]
    fn transfer_marks_known_agent_dirty_for_its_own_token() {
        let idx = AgentBalanceIndexer::new();
        idx.apply_batch(&batch(
            vec![EventPayload::AgentRegistered(AgentRegistered {
                address: addr(1),
                creator: addr(9),
                name: "a".into(),
                system_prompt: "s".into(),
                prompt_price: 1,
                token_address: addr(0xEE),
                end_time: 2000,
            })],
            10,
        ));
        idx.apply_batch(&batch(
            vec![EventPayload::Transfer(Transfer {
                token: addr(0xEE),
                from: addr(0xFF),
                to: addr(1),
                amount: 500,
            })],
            11,
        ));
        assert_eq!(idx.state.read().unwrap().dirty.len(), 1);
    }

    #[test]
    fn leaderboard_sorts_unknown_rate_below_known() {
        let idx = AgentBalanceIndexer::new();
        for (n, agent) in [(1u8, addr(1)), (2u8, addr(2))] {
            idx.apply_batch(&batch(
                vec![EventPayload::AgentRegistered(AgentRegistered {
                    address: agent,
                    creator: addr(9),
                    name: format!("agent{n}"),
                    system_prompt: "s".into(),
                    prompt_price: 1,
                    token_address: addr(n),
                    end_time: 9_999_999_999,
                })],
                10,
            ));
        }
        idx.commit_balance(addr(1), 1000);
        idx.commit_balance(addr(2), 500);

        let tokens = TokenIndexer::new();
        let mut rates = HashMap::new();
        rates.insert(addr(1), 2_000_000_000_000_000_000u128);
        tokens.seed_rates(&rates);

        let page = idx.get_agent_leaderboard(0, 10, &tokens);
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].agent_address, addr(1));
        assert_eq!(page.items[0].usd_value, 2000);
        assert_eq!(page.items[1].agent_address, addr(2));
        assert_eq!(page.items[1].usd_value, 0);
    }
}
