//! `QueryService`: a stateless composition layer over the four projections
//! (spec §4.F). Every handler reads each projection under its own lock and
//! assembles a response DTO; a failed read for one agent in a bulk listing
//! is skipped, not an error.

use crate::indexers::{AgentBalanceIndexer, AgentIndexer, AgentUsageIndexer, TokenIndexer};
use crate::query::responses::{AgentData, AgentPageResponse, LatestPromptResponse};
use chrono::Utc;

pub struct QueryService<'a> {
    pub agents: &'a AgentIndexer,
    pub usage: &'a AgentUsageIndexer,
    pub balances: &'a AgentBalanceIndexer,
    pub tokens: &'a TokenIndexer,
    pub page_size: usize,
}

impl<'a> QueryService<'a> {
    pub fn new(
        agents: &'a AgentIndexer,
        usage: &'a AgentUsageIndexer,
        balances: &'a AgentBalanceIndexer,
        tokens: &'a TokenIndexer,
        page_size: usize,
    ) -> Self {
        Self {
            agents,
            usage,
            balances,
            tokens,
            page_size,
        }
    }

    /// Requires both `AgentInfo` and `AgentBalance` to be present — they are
    /// created together on `AgentRegistered`, so divergence means the
    /// address genuinely isn't known yet. A missing `AgentUsage` is not a
    /// miss: an agent with no prompts yet has legitimately empty usage.
    fn build_agent_data(&self, address: crate::core::types::Address) -> Option<AgentData> {
        let info = self.agents.get_agent_info(address)?;
        let balance = self.balances.get_balance(address)?;
        let usage = self.usage.get_agent_usage(address).unwrap_or_default();
        let now = Utc::now().timestamp();

        Some(AgentData {
            pending: balance.pending,
            address: info.address,
            token: info.token_address,
            name: info.name,
            balance: balance.amount.into(),
            end_time: info.end_time,
            is_drained: usage.is_drained,
            is_finalized: now > info.end_time || usage.is_drained,
            prompt_price: info.prompt_price.into(),
            break_attempts: usage.break_attempts,
            latest_prompts: usage
                .latest_prompts
                .into_iter()
                .map(|p| LatestPromptResponse {
                    prompt: p.prompt,
                    is_success: p.is_success,
                    drained_to: p.drained_to,
                })
                .collect(),
        })
    }

    pub fn get_agent(&self, address: crate::core::types::Address) -> Option<AgentData> {
        self.build_agent_data(address)
    }

    pub fn get_leaderboard(&self, page: usize) -> AgentPageResponse {
        let start = page * self.page_size;
        let end = start + self.page_size;
        let leaderboard = self.balances.get_agent_leaderboard(start, end, self.tokens);
        let agents = leaderboard
            .items
            .into_iter()
            .filter_map(|entry| self.build_agent_data(entry.agent_address))
            .collect();
        AgentPageResponse {
            agents,
            total: leaderboard.total,
            page,
            page_size: self.page_size,
            last_block: leaderboard.last_block,
        }
    }

    pub fn get_agents_by_creator(&self, creator: crate::core::types::Address, page: usize) -> Option<AgentPageResponse> {
        let start = page * self.page_size;
        let result = self.agents.get_agents_by_creator(creator, start, self.page_size)?;
        let agents = result
            .items
            .into_iter()
            .filter_map(|addr| self.build_agent_data(addr))
            .collect();
        Some(AgentPageResponse {
            agents,
            total: result.total,
            page,
            page_size: self.page_size,
            last_block: result.last_block,
        })
    }

    pub fn search_by_name(&self, prefix: &str, page: usize) -> Option<AgentPageResponse> {
        let start = page * self.page_size;
        let result = self.agents.get_agent_infos_by_name_prefix(prefix, start, self.page_size)?;
        let agents = result
            .items
            .into_iter()
            .filter_map(|info| self.build_agent_data(info.address))
            .collect();
        Some(AgentPageResponse {
            agents,
            total: result.total,
            page,
            page_size: self.page_size,
            last_block: result.last_block,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Address, AgentRegistered, ChainEvent, EventPayload};
    use crate::watcher::EventBatch;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 32])
    }

    fn registered(address: Address, creator: Address, name: &str) -> EventBatch {
        EventBatch {
            events: vec![ChainEvent {
                block: 10,
                log_index: 0,
                emitter: addr(0xAA),
                payload: EventPayload::AgentRegistered(AgentRegistered {
                    address,
                    creator,
                    name: name.to_string(),
                    system_prompt: "sp".into(),
                    prompt_price: 100,
                    token_address: addr(0xEE),
                    end_time: 9_999_999_999,
                }),
            }],
            from_block: 10,
            to_block: 10,
        }
    }

    #[test]
    fn missing_agent_is_a_404_not_an_error() {
        let agents = AgentIndexer::new();
        let usage = AgentUsageIndexer::new(10);
        let balances = AgentBalanceIndexer::new();
        let tokens = TokenIndexer::new();
        let svc = QueryService::new(&agents, &usage, &balances, &tokens, 20);
        assert!(svc.get_agent(addr(1)).is_none());
    }

    #[test]
    fn known_agent_round_trips_through_all_three_projections() {
        let agents = AgentIndexer::new();
        let usage = AgentUsageIndexer::new(10);
        let balances = AgentBalanceIndexer::new();
        let tokens = TokenIndexer::new();

        let batch = registered(addr(1), addr(9), "alice");
        agents.apply_batch(&batch);
        balances.apply_batch(&batch);

        let svc = QueryService::new(&agents, &usage, &balances, &tokens, 20);
        let data = svc.get_agent(addr(1)).expect("agent should be visible");
        assert_eq!(data.name, "alice");
        assert!(data.pending);
        assert!(!data.is_drained);
    }
}
