//! `AgentUsageIndexer`: correlates `PromptPaid` ↔ `PromptConsumed` and keeps
//! a bounded per-agent history (spec §4.D).

use crate::cache::{PromptCache, PromptCacheEntry};
use crate::core::types::{Address, AgentUsage, AgentUsageLatestPrompt, BlockNumber, EventPayload};
use crate::watcher::EventBatch;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::error;

const DEFAULT_CACHE_CAPACITY: usize = 10_000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

struct State {
    usage: HashMap<Address, AgentUsage>,
    cache: PromptCache,
    last_indexed_block: BlockNumber,
}

pub struct AgentUsageIndexer {
    max_prompts: usize,
    state: RwLock<State>,
}

impl AgentUsageIndexer {
    pub fn new(max_prompts: usize) -> Self {
        Self::with_cache(max_prompts, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache(max_prompts: usize, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            max_prompts,
            state: RwLock::new(State {
                usage: HashMap::new(),
                cache: PromptCache::new(cache_capacity, cache_ttl),
                last_indexed_block: 0,
            }),
        }
    }

    fn on_prompt_paid(&self, state: &mut State, agent: Address, prompt_id: u64, tweet_id: u64, prompt: String) {
        state.cache.insert(agent, prompt_id, PromptCacheEntry { tweet_id, prompt });
    }

    fn on_prompt_consumed(&self, state: &mut State, agent: Address, prompt_id: u64, drained_to: Address) {
        let cached = state.cache.take(agent, prompt_id);
        if cached.is_none() {
            error!(agent = %agent, prompt_id, "prompt consumed with no matching paid event in window");
        }
        let (tweet_id, prompt) = cached
            .map(|c| (c.tweet_id, c.prompt))
            .unwrap_or((0, String::new()));

        let is_success = drained_to != agent;
        let usage = state.usage.entry(agent).or_default();
        usage.break_attempts += 1;
        if is_success {
            usage.is_drained = true;
        }
        usage.latest_prompts.push_back(AgentUsageLatestPrompt {
            prompt_id,
            tweet_id,
            prompt,
            is_success,
            // The contract signals "no drain happened" by setting
            // `drainedTo == agent`; zero it so a failed attempt never reports
            // a drain destination.
            drained_to: if is_success { drained_to } else { Address::ZERO },
        });
        while usage.latest_prompts.len() > self.max_prompts {
            usage.latest_prompts.pop_front();
        }
    }

    pub fn apply_batch(&self, batch: &EventBatch) {
        let mut state = self.state.write().expect("usage indexer lock poisoned");
        for event in &batch.events {
            match &event.payload {
                EventPayload::PromptPaid(e) => {
                    self.on_prompt_paid(&mut state, e.agent, e.prompt_id, e.tweet_id, e.prompt.clone())
                }
                EventPayload::PromptConsumed(e) => {
                    self.on_prompt_consumed(&mut state, e.agent, e.prompt_id, e.drained_to)
                }
                _ => {}
            }
        }
        if batch.to_block > state.last_indexed_block {
            state.last_indexed_block = batch.to_block;
        }
    }

    pub fn get_agent_usage(&self, agent: Address) -> Option<AgentUsage> {
        self.state
            .read()
            .expect("usage indexer lock poisoned")
            .usage
            .get(&agent)
            .cloned()
    }

    pub fn last_indexed_block(&self) -> BlockNumber {
        self.state.read().expect("usage indexer lock poisoned").last_indexed_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChainEvent, PromptConsumed, PromptPaid};

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
    fn failed_attempt_then_success() {
        let idx = AgentUsageIndexer::new(10);
        idx.apply_batch(&batch(
            vec![EventPayload::PromptPaid(PromptPaid {
                agent: addr(1),
                prompt_id: 1,
                tweet_id: 555,
                prompt: "hi".into(),
            })],
            11,
        ));
        idx.apply_batch(&batch(
            vec![EventPayload::PromptConsumed(PromptConsumed {
                agent: addr(1),
                prompt_id: 1,
                drained_to: addr(1),
            })],
            12,
        ));
        let usage = idx.get_agent_usage(addr(1)).unwrap();
        assert_eq!(usage.break_attempts, 1);
        assert!(!usage.is_drained);
        assert_eq!(usage.latest_prompts[0].tweet_id, 555);
        assert!(!usage.latest_prompts[0].is_success);
        assert_eq!(usage.latest_prompts[0].drained_to, Address::ZERO);

        idx.apply_batch(&batch(
            vec![EventPayload::PromptPaid(PromptPaid {
                agent: addr(1),
                prompt_id: 2,
                tweet_id: 556,
                prompt: "again".into(),
            })],
            13,
        ));
        idx.apply_batch(&batch(
            vec![EventPayload::PromptConsumed(PromptConsumed {
                agent: addr(1),
                prompt_id: 2,
                drained_to: addr(0xBE),
            })],
            14,
        ));
        let usage = idx.get_agent_usage(addr(1)).unwrap();
        assert!(usage.is_drained);
        assert!(usage.latest_prompts[1].is_success);
        assert_eq!(usage.latest_prompts[1].drained_to, addr(0xBE));
    }

    #[test]
    fn consume_without_paid_is_a_recorded_miss() {
        let idx = AgentUsageIndexer::new(10);
        idx.apply_batch(&batch(
            vec![EventPayload::PromptConsumed(PromptConsumed {
                agent: addr(1),
                prompt_id: 42,
                drained_to: addr(1),
            })],
            10,
        ));
        let usage = idx.get_agent_usage(addr(1)).unwrap();
        assert_eq!(usage.break_attempts, 1);
        assert_eq!(usage.latest_prompts[0].tweet_id, 0);
        assert_eq!(usage.latest_prompts[0].prompt, "");
        assert_eq!(usage.latest_prompts[0].drained_to, Address::ZERO);
    }

    #[test]
    fn history_caps_at_max_prompts_dropping_oldest() {
        let idx = AgentUsageIndexer::new(3);
        for id in 1..=4u64 {
            idx.apply_batch(&batch(
                vec![EventPayload::PromptConsumed(PromptConsumed {
                    agent: addr(1),
                    prompt_id: id,
                    drained_to: addr(1),
                })],
                10 + id,
            ));
        }
        let usage = idx.get_agent_usage(addr(1)).unwrap();
        let ids: Vec<u64> = usage.latest_prompts.iter().map(|p| p.prompt_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn is_drained_never_reverts() {
        let idx = AgentUsageIndexer::new(10);
        idx.apply_batch(&batch(
            vec![EventPayload::PromptConsumed(PromptConsumed {
                agent: addr(1),
                prompt_id: 1,
                drained_to: addr(0xBE),
            })],
            10,
        ));
        idx.apply_batch(&batch(
            vec![EventPayload::PromptConsumed(PromptConsumed {
                agent: addr(1),
                prompt_id: 2,
                drained_to: addr(1),
            })],
            11,
        ));
        assert!(idx.get_agent_usage(addr(1)).unwrap().is_drained);
    }
}
