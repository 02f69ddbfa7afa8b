//! Configuration for the agent indexer (spec §6).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use validator::Validate;

use crate::core::types::Address;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct IndexerConfig {
    pub watcher: WatcherSettings,
    pub balance: BalanceSettings,
    pub price: PriceSettings,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WatcherSettings {
    pub registry_address: String,
    pub starting_block: u64,
    #[validate(range(min = 0, max = 1000))]
    pub safe_block_delta: u64,
    #[validate(range(min = 1, max = 100_000))]
    pub index_chunk_size: u64,
    #[validate(range(min = 1, max = 60))]
    pub event_startup_tick_rate_secs: u64,
    #[validate(range(min = 1, max = 300))]
    pub event_tick_rate_secs: u64,
    pub tracked_addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BalanceSettings {
    #[validate(range(min = 1, max = 300))]
    pub balance_tick_rate_secs: u64,
    #[validate(range(min = 1, max = 256))]
    pub worker_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PriceSettings {
    #[validate(range(min = 1, max = 3600))]
    pub price_tick_rate_secs: u64,
    /// Bootstrap static rate map (hex address -> USD per smallest-unit,
    /// scaled 10^18), used until the oracle first responds.
    pub token_rates: HashMap<String, u128>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    pub server_addr: String,
    pub enable_cors: bool,
    #[validate(range(min = 1, max = 500))]
    pub page_size: usize,
    #[validate(range(min = 1, max = 1000))]
    pub max_prompts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub structured_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheSettings {
    #[validate(range(min = 1, max = 1_000_000))]
    pub prompt_cache_capacity: usize,
    #[validate(range(min = 1, max = 86_400))]
    pub prompt_cache_ttl_secs: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            registry_address: Address::ZERO.to_hex(),
            starting_block: 0,
            safe_block_delta: 0,
            index_chunk_size: 1_000,
            event_startup_tick_rate_secs: 1,
            event_tick_rate_secs: 12,
            tracked_addresses: Vec::new(),
        }
    }
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            balance_tick_rate_secs: 10,
            worker_pool_size: crate::indexers::DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            price_tick_rate_secs: 60,
            token_rates: HashMap::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            enable_cors: true,
            page_size: 20,
            max_prompts: 10,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            structured_logging: false,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            prompt_cache_capacity: 10_000,
            prompt_cache_ttl_secs: 30 * 60,
        }
    }
}

impl IndexerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
        let config: Self = toml::from_str(&content).context("parsing config file as TOML")?;
        config.validate().context("validating config")?;
        Ok(config)
    }

    pub fn registry_address(&self) -> Result<Address> {
        Address::from_str(&self.watcher.registry_address).context("parsing watcher.registry_address")
    }

    pub fn tracked_addresses(&self) -> Result<Vec<Address>> {
        self.watcher
            .tracked_addresses
            .iter()
            .map(|s| Address::from_str(s).with_context(|| format!("parsing tracked address {s}")))
            .collect()
    }

    pub fn token_rates(&self) -> Result<HashMap<Address, u128>> {
        self.price
            .token_rates
            .iter()
            .map(|(addr, rate)| Ok((Address::from_str(addr).with_context(|| format!("parsing token_rates key {addr}"))?, *rate)))
            .collect()
    }
}
