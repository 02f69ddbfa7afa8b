//! End-to-end scenario tests against the four projections, the event
//! watcher's typed fan-out, and the query layer.

use agentdex_indexer::core::{
    Address, AgentRegistered, ChainEvent, EventKind, EventPayload, PromptConsumed, PromptPaid,
    RawEvent, Transfer,
};
use agentdex_indexer::indexers::{AgentBalanceIndexer, AgentIndexer, AgentUsageIndexer, TokenIndexer};
use agentdex_indexer::query::QueryService;
use agentdex_indexer::testing::MockChainClient;
use agentdex_indexer::watcher::{classify, EventBatch, EventWatcher, WatcherConfig, MIN_SUBSCRIBER_CAPACITY};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 32])
}

struct Fixture {
    agents: AgentIndexer,
    usage: AgentUsageIndexer,
    balances: AgentBalanceIndexer,
    tokens: TokenIndexer,
}

impl Fixture {
    fn new() -> Self {
        Self {
            agents: AgentIndexer::new(),
            usage: AgentUsageIndexer::new(3),
            balances: AgentBalanceIndexer::new(),
            tokens: TokenIndexer::new(),
        }
    }

    fn apply(&self, block: u64, events: Vec<EventPayload>) {
        let batch = EventBatch {
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
        };
        self.agents.apply_batch(&batch);
        self.usage.apply_batch(&batch);
        self.balances.apply_batch(&batch);
        self.tokens.apply_batch(&batch);
    }

    fn query(&self) -> QueryService<'_> {
        QueryService::new(&self.agents, &self.usage, &self.balances, &self.tokens, 20)
    }
}

fn registered(address: Address, creator: Address, name: &str, token: Address, end_time: i64) -> EventPayload {
    EventPayload::AgentRegistered(AgentRegistered {
        address,
        creator,
        name: name.to_string(),
        system_prompt: "you are a vault".to_string(),
        prompt_price: 100,
        token_address: token,
        end_time,
    })
}

#[test]
fn s1_registration_then_one_failed_attempt() {
    let fx = Fixture::new();
    fx.apply(10, vec![registered(addr(0xA1), addr(0xC1), "alice", addr(0xB1), 2000)]);
    fx.apply(
        11,
        vec![EventPayload::PromptPaid(PromptPaid {
            agent: addr(0xA1),
            prompt_id: 1,
            tweet_id: 555,
            prompt: "hi".to_string(),
        })],
    );
    fx.apply(
        12,
        vec![EventPayload::PromptConsumed(PromptConsumed {
            agent: addr(0xA1),
            prompt_id: 1,
            drained_to: addr(0xA1),
        })],
    );

    assert_eq!(fx.agents.get_agent_info(addr(0xA1)).unwrap().name, "alice");
    let usage = fx.usage.get_agent_usage(addr(0xA1)).unwrap();
    assert_eq!(usage.break_attempts, 1);
    assert!(!usage.is_drained);
    assert_eq!(usage.latest_prompts.len(), 1);
    assert_eq!(usage.latest_prompts[0].tweet_id, 555);
    assert_eq!(usage.latest_prompts[0].prompt, "hi");
    assert!(!usage.latest_prompts[0].is_success);
    assert_eq!(usage.latest_prompts[0].drained_to, Address::ZERO);
}

#[test]
fn s2_successful_drain() {
    let fx = Fixture::new();
    fx.apply(10, vec![registered(addr(0xA1), addr(0xC1), "alice", addr(0xB1), 2000)]);
    fx.apply(
        11,
        vec![EventPayload::PromptPaid(PromptPaid {
            agent: addr(0xA1),
            prompt_id: 1,
            tweet_id: 555,
            prompt: "hi".to_string(),
        })],
    );
    fx.apply(
        12,
        vec![EventPayload::PromptConsumed(PromptConsumed {
            agent: addr(0xA1),
            prompt_id: 1,
            drained_to: addr(0xBE),
        })],
    );

    let usage = fx.usage.get_agent_usage(addr(0xA1)).unwrap();
    assert!(usage.is_drained);
    assert!(usage.latest_prompts[0].is_success);
    assert_eq!(usage.latest_prompts[0].drained_to, addr(0xBE));
}

#[test]
fn s3_consume_without_prior_paid_event() {
    let fx = Fixture::new();
    fx.apply(
        10,
        vec![EventPayload::PromptConsumed(PromptConsumed {
            agent: addr(0xA1),
            prompt_id: 42,
            drained_to: addr(0xA1),
        })],
    );

    let usage = fx.usage.get_agent_usage(addr(0xA1)).unwrap();
    assert_eq!(usage.break_attempts, 1);
    assert_eq!(usage.latest_prompts[0].tweet_id, 0);
    assert_eq!(usage.latest_prompts[0].prompt, "");
    assert_eq!(usage.latest_prompts[0].drained_to, Address::ZERO);
}

#[test]
fn s4_history_cap() {
    let fx = Fixture::new();
    for id in 1..=4u64 {
        fx.apply(
            10 + id,
            vec![EventPayload::PromptConsumed(PromptConsumed {
                agent: addr(0xA1),
                prompt_id: id,
                drained_to: addr(0xA1),
            })],
        );
    }
    let usage = fx.usage.get_agent_usage(addr(0xA1)).unwrap();
    let ids: Vec<u64> = usage.latest_prompts.iter().map(|p| p.prompt_id).collect();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[tokio::test]
async fn s5_leaderboard_tracks_live_balances_through_the_refresh_loop() {
    let tokens = TokenIndexer::new();
    let mut rates = HashMap::new();
    rates.insert(addr(0xB1), 2_000_000_000_000_000_000u128);
    tokens.seed_rates(&rates);

    let chain = Arc::new(MockChainClient::new());
    chain.set_balance(addr(0xB1), addr(0xA1), 1000);
    chain.set_balance(addr(0xB1), addr(0xA2), 500);

    let shutdown = CancellationToken::new();
    let balances = Arc::new(AgentBalanceIndexer::new());
    balances.apply_batch(&EventBatch {
        events: vec![
            ChainEvent {
                block: 10,
                log_index: 0,
                emitter: addr(0xAA),
                payload: registered(addr(0xA1), addr(0xC1), "alice", addr(0xB1), 9_999_999_999),
            },
            ChainEvent {
                block: 10,
                log_index: 1,
                emitter: addr(0xAA),
                payload: registered(addr(0xA2), addr(0xC1), "bob", addr(0xB1), 9_999_999_999),
            },
        ],
        from_block: 10,
        to_block: 10,
    });

    let handle = {
        let balances = balances.clone();
        let chain = chain.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            balances.run_balance_refresh(chain, Duration::from_millis(5), 4, shutdown).await;
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    handle.await.unwrap();

    let page = balances.get_agent_leaderboard(0, 10, &tokens);
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].agent_address, addr(0xA1));
    assert_eq!(page.items[0].usd_value, 2000);
    assert!(page.items[0].is_active);
    assert_eq!(page.items[1].agent_address, addr(0xA2));
    assert_eq!(page.items[1].usd_value, 1000);

    let balance = balances.get_balance(addr(0xA1)).unwrap();
    assert!(!balance.pending);
    assert_eq!(balance.amount, 1000);
}

#[tokio::test]
async fn s6_spoofed_register_is_dropped_by_the_watcher_before_any_projection_sees_it() {
    let chain = Arc::new(MockChainClient::new());
    chain.set_head(5);

    let registry = addr(0x01);
    let spoofer = addr(0xBAD);

    chain.push_event(RawEvent {
        block: 3,
        log_index: 0,
        emitter: registry,
        selector: classify::selector_for(EventKind::AgentRegistered),
        data: serde_json::to_vec(&AgentRegistered {
            address: addr(0xA1),
            creator: addr(0xC1),
            name: "legit".to_string(),
            system_prompt: "sp".to_string(),
            prompt_price: 1,
            token_address: addr(0xB1),
            end_time: 2000,
        })
        .unwrap(),
    });
    chain.push_event(RawEvent {
        block: 3,
        log_index: 1,
        emitter: spoofer,
        selector: classify::selector_for(EventKind::AgentRegistered),
        data: serde_json::to_vec(&AgentRegistered {
            address: addr(0xA2),
            creator: addr(0xC1),
            name: "spoofed".to_string(),
            system_prompt: "sp".to_string(),
            prompt_price: 1,
            token_address: addr(0xB1),
            end_time: 2000,
        })
        .unwrap(),
    });

    let config = WatcherConfig {
        starting_block: 1,
        safe_block_delta: 0,
        index_chunk_size: 100,
        startup_tick_rate: Duration::from_millis(5),
        tick_rate: Duration::from_millis(5),
        // The spoofer is a tracked agent contract, not the registry — the
        // chain-level address filter lets its events through, so the
        // registry-only emitter check inside the watcher is what must
        // reject it.
        tracked_addresses: vec![registry, spoofer],
        registry_address: registry,
    };
    let watcher = Arc::new(EventWatcher::new(chain, config));
    let (_id, mut rx) = watcher.subscribe(EventKind::AgentRegistered, MIN_SUBSCRIBER_CAPACITY);

    let shutdown = CancellationToken::new();
    let run_handle = {
        let watcher = watcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { watcher.run(shutdown).await })
    };

    let batch = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected a batch within the timeout")
        .expect("subscriber channel closed unexpectedly");

    assert_eq!(batch.events.len(), 1);
    match &batch.events[0].payload {
        EventPayload::AgentRegistered(e) => assert_eq!(e.name, "legit"),
        other => panic!("unexpected payload: {other:?}"),
    }

    shutdown.cancel();
    run_handle.await.unwrap().unwrap();
}

#[test]
fn watermark_is_monotone_across_batches_even_when_a_batch_has_no_matching_events() {
    let fx = Fixture::new();
    fx.apply(5, vec![registered(addr(0xA1), addr(0xC1), "alice", addr(0xB1), 9_999_999_999)]);
    assert_eq!(fx.agents.last_indexed_block(), 5);
    // A later batch with zero AgentRegistered events still advances the watermark.
    fx.apply(
        9,
        vec![EventPayload::Transfer(Transfer {
            token: addr(0xB1),
            from: addr(0xFF),
            to: addr(0xA1),
            amount: 1,
        })],
    );
    assert_eq!(fx.agents.last_indexed_block(), 9);
}

#[test]
fn leaderboard_membership_implies_agent_is_registered() {
    let fx = Fixture::new();
    fx.apply(10, vec![registered(addr(0xA1), addr(0xC1), "alice", addr(0xB1), 9_999_999_999)]);
    let page = fx.balances.get_agent_leaderboard(0, 10, &fx.tokens);
    for entry in page.items {
        assert!(fx.agents.get_agent_info(entry.agent_address).is_some());
    }
}

#[test]
fn query_service_404s_on_unknown_agent_but_empty_page_on_bulk_miss() {
    let fx = Fixture::new();
    let svc = fx.query();
    assert!(svc.get_agent(addr(0x99)).is_none());
    let page = svc.get_leaderboard(0);
    assert_eq!(page.agents.len(), 0);
    assert_eq!(page.total, 0);
}

#[test]
fn is_finalized_once_end_time_has_passed() {
    let fx = Fixture::new();
    fx.apply(10, vec![registered(addr(0xA1), addr(0xC1), "alice", addr(0xB1), 1)]);
    let data = fx.query().get_agent(addr(0xA1)).unwrap();
    assert!(data.is_finalized);
}

#[test]
fn break_attempts_count_matches_the_number_of_consume_events() {
    let fx = Fixture::new();
    for id in 1..=5u64 {
        fx.apply(
            10 + id,
            vec![EventPayload::PromptConsumed(PromptConsumed {
                agent: addr(0xA1),
                prompt_id: id,
                drained_to: addr(0xA1),
            })],
        );
    }
    assert_eq!(fx.usage.get_agent_usage(addr(0xA1)).unwrap().break_attempts, 5);
}
