//! In-memory `ChainClient`/`PriceOracle` test doubles, grounded in the
//! project's mock-Geyser-client pattern: no network, deterministic,
//! driven entirely by data the test installs ahead of time.

use crate::core::chain::{ChainClient, EventFilter, PriceOracle};
use crate::core::error::{ChainError, IndexerError, IndexerResult};
use crate::core::types::{Address, BlockNumber, RawEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MockChainClient {
    head: Mutex<BlockNumber>,
    events: Mutex<Vec<RawEvent>>,
    calls: Mutex<HashMap<(Address, String), Vec<u8>>>,
    balances: Mutex<HashMap<(Address, Address), u128>>,
    fail_next_events_call: Mutex<bool>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, head: BlockNumber) {
        *self.head.lock().expect("mock chain lock poisoned") = head;
    }

    pub fn push_event(&self, event: RawEvent) {
        self.events.lock().expect("mock chain lock poisoned").push(event);
    }

    pub fn set_call_response(&self, contract: Address, selector: &str, response: Vec<u8>) {
        self.calls
            .lock()
            .expect("mock chain lock poisoned")
            .insert((contract, selector.to_string()), response);
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: u128) {
        self.balances
            .lock()
            .expect("mock chain lock poisoned")
            .insert((token, owner), amount);
    }

    pub fn fail_next_events_call(&self) {
        *self.fail_next_events_call.lock().expect("mock chain lock poisoned") = true;
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> IndexerResult<BlockNumber> {
        Ok(*self.head.lock().expect("mock chain lock poisoned"))
    }

    async fn events(&self, filter: EventFilter) -> IndexerResult<Vec<RawEvent>> {
        {
            let mut fail = self.fail_next_events_call.lock().expect("mock chain lock poisoned");
            if *fail {
                *fail = false;
                return Err(IndexerError::Chain(ChainError::Rpc("injected failure".into())));
            }
        }
        let events = self.events.lock().expect("mock chain lock poisoned");
        Ok(events
            .iter()
            .filter(|e| e.block >= filter.from_block && e.block <= filter.to_block)
            .filter(|e| filter.addresses.is_empty() || filter.addresses.contains(&e.emitter))
            .cloned()
            .collect())
    }

    async fn call(&self, contract: Address, selector: &str, _calldata: &[u8]) -> IndexerResult<Vec<u8>> {
        self.calls
            .lock()
            .expect("mock chain lock poisoned")
            .get(&(contract, selector.to_string()))
            .cloned()
            .ok_or_else(|| IndexerError::NotFound {
                what: format!("mock response for {selector} on {contract}"),
            })
    }

    async fn erc20_balance_of(&self, token: Address, owner: Address) -> IndexerResult<u128> {
        Ok(self
            .balances
            .lock()
            .expect("mock chain lock poisoned")
            .get(&(token, owner))
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct MockPriceOracle {
    rates: Mutex<HashMap<Address, u128>>,
}

impl MockPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&self, token: Address, rate: u128) {
        self.rates.lock().expect("mock oracle lock poisoned").insert(token, rate);
    }
}

#[async_trait]
impl PriceOracle for MockPriceOracle {
    async fn get_rate(&self, token: Address) -> IndexerResult<u128> {
        self.rates
            .lock()
            .expect("mock oracle lock poisoned")
            .get(&token)
            .copied()
            .ok_or_else(|| IndexerError::Oracle(format!("no rate configured for {token}")))
    }
}
