//! Agent indexer entrypoint.
//!
//! Wires configuration, the chain/oracle collaborators, the event watcher,
//! the four projections, and the query API together, then runs them under
//! one supervisor until shutdown or a fatal task error.

use agentdex_indexer::api::{self, ApiState};
use agentdex_indexer::config::IndexerConfig;
use agentdex_indexer::indexers::{AgentBalanceIndexer, AgentIndexer, AgentUsageIndexer, TokenIndexer};
use agentdex_indexer::testing::{MockChainClient, MockPriceOracle};
use agentdex_indexer::watcher::{EventWatcher, WatcherConfig};
use agentdex_indexer::Supervisor;
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

#[derive(Parser)]
#[command(name = "agentdex-indexer")]
#[command(about = "Event-driven indexer for on-chain agent contracts", version, author)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "indexer-config.toml")]
    config: String,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate configuration and exit without starting any task
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        IndexerConfig::from_file(&cli.config)?
    } else {
        warn!(path = %cli.config, "config file not found, using defaults");
        IndexerConfig::default()
    };

    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    init_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting agent indexer");
    config.validate()?;

    if cli.dry_run {
        info!("dry run: configuration is valid, exiting");
        return Ok(());
    }

    let registry_address = config.registry_address()?;
    let tracked_addresses = config.tracked_addresses()?;
    let token_rates = config.token_rates()?;

    // No production CHAIN/ORACLE implementation ships with the core (spec
    // treats both as external collaborators); the in-memory test doubles
    // stand in here so the wiring below is exercisable end to end.
    warn!("running against the in-memory mock chain client and price oracle");
    let chain = Arc::new(MockChainClient::new());
    let oracle = Arc::new(MockPriceOracle::new());

    let watcher_config = WatcherConfig {
        starting_block: config.watcher.starting_block,
        safe_block_delta: config.watcher.safe_block_delta,
        index_chunk_size: config.watcher.index_chunk_size,
        startup_tick_rate: std::time::Duration::from_secs(config.watcher.event_startup_tick_rate_secs),
        tick_rate: std::time::Duration::from_secs(config.watcher.event_tick_rate_secs),
        tracked_addresses,
        registry_address,
    };
    let watcher = Arc::new(EventWatcher::new(chain.clone(), watcher_config));

    let tokens = Arc::new(TokenIndexer::new());
    tokens.seed_rates(&token_rates);
    let agents = Arc::new(AgentIndexer::new());
    let usage = Arc::new(AgentUsageIndexer::with_cache(
        config.api.max_prompts,
        config.cache.prompt_cache_capacity,
        std::time::Duration::from_secs(config.cache.prompt_cache_ttl_secs),
    ));
    let balances = Arc::new(AgentBalanceIndexer::new());

    let shutdown = CancellationToken::new();
    let mut supervisor = Supervisor::new(shutdown.clone());

    {
        let watcher = watcher.clone();
        let shutdown = shutdown.clone();
        supervisor.spawn("event-watcher", async move { watcher.run(shutdown).await });
    }

    spawn_projection_tasks(&mut supervisor, &watcher, &tokens, &agents, &usage, &balances, &shutdown);

    {
        let tokens = tokens.clone();
        let oracle = oracle.clone();
        let tick = std::time::Duration::from_secs(config.price.price_tick_rate_secs);
        let shutdown = shutdown.clone();
        supervisor.spawn("price-refresh", async move {
            tokens.run_price_refresh(oracle, tick, shutdown).await;
            Ok(())
        });
    }

    {
        let balances = balances.clone();
        let chain = chain.clone();
        let tick = std::time::Duration::from_secs(config.balance.balance_tick_rate_secs);
        let pool = config.balance.worker_pool_size;
        let shutdown = shutdown.clone();
        supervisor.spawn("balance-refresh", async move {
            balances.run_balance_refresh(chain, tick, pool, shutdown).await;
            Ok(())
        });
    }

    let api_state = ApiState {
        agents: agents.clone(),
        usage: usage.clone(),
        balances: balances.clone(),
        tokens: tokens.clone(),
        page_size: config.api.page_size,
    };
    let api_handle = api::start_server(api_state, &config.api.server_addr, config.api.enable_cors).await?;
    info!(addr = %config.api.server_addr, "query API started");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
            shutdown.cancel();
        }
        result = supervisor.run() => {
            result?;
        }
        result = api_handle => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server task panicked");
            }
        }
    }

    info!("agent indexer shut down");
    Ok(())
}

/// Each projection runs its own subscription-driven task: subscribe to the
/// event kinds it cares about, then drive `apply_batch` off the channel
/// until the watcher drops it or shutdown fires.
#[allow(clippy::too_many_arguments)]
fn spawn_projection_tasks(
    supervisor: &mut Supervisor,
    watcher: &Arc<EventWatcher<MockChainClient>>,
    tokens: &Arc<TokenIndexer>,
    agents: &Arc<AgentIndexer>,
    usage: &Arc<AgentUsageIndexer>,
    balances: &Arc<AgentBalanceIndexer>,
    shutdown: &CancellationToken,
) {
    use agentdex_indexer::core::EventKind;
    use agentdex_indexer::watcher::MIN_SUBSCRIBER_CAPACITY;

    {
        let tokens = tokens.clone();
        let (_id, mut rx) = watcher.subscribe(EventKind::TokenAdded, MIN_SUBSCRIBER_CAPACITY);
        let shutdown = shutdown.clone();
        supervisor.spawn("token-indexer", async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    batch = rx.recv() => match batch {
                        Some(batch) => tokens.apply_batch(&batch),
                        None => return Ok(()),
                    }
                }
            }
        });
    }

    {
        let agents = agents.clone();
        let (_id, mut rx) = watcher.subscribe(EventKind::AgentRegistered, MIN_SUBSCRIBER_CAPACITY);
        let shutdown = shutdown.clone();
        supervisor.spawn("agent-indexer", async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    batch = rx.recv() => match batch {
                        Some(batch) => agents.apply_batch(&batch),
                        None => return Ok(()),
                    }
                }
            }
        });
    }

    {
        let usage = usage.clone();
        let (_id, mut rx) = watcher.subscribe(EventKind::PromptPaid, MIN_SUBSCRIBER_CAPACITY);
        let shutdown = shutdown.clone();
        supervisor.spawn("usage-indexer-paid", async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    batch = rx.recv() => match batch {
                        Some(batch) => usage.apply_batch(&batch),
                        None => return Ok(()),
                    }
                }
            }
        });
    }

    {
        let usage = usage.clone();
        let (_id, mut rx) = watcher.subscribe(EventKind::PromptConsumed, MIN_SUBSCRIBER_CAPACITY);
        let shutdown = shutdown.clone();
        supervisor.spawn("usage-indexer-consumed", async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    batch = rx.recv() => match batch {
                        Some(batch) => usage.apply_batch(&batch),
                        None => return Ok(()),
                    }
                }
            }
        });
    }

    {
        let balances = balances.clone();
        let (_id, mut rx) = watcher.subscribe(EventKind::AgentRegistered, MIN_SUBSCRIBER_CAPACITY);
        let shutdown = shutdown.clone();
        supervisor.spawn("balance-indexer-registered", async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    batch = rx.recv() => match batch {
                        Some(batch) => balances.apply_batch(&batch),
                        None => return Ok(()),
                    }
                }
            }
        });
    }

    {
        let balances = balances.clone();
        let (_id, mut rx) = watcher.subscribe(EventKind::Transfer, MIN_SUBSCRIBER_CAPACITY);
        let shutdown = shutdown.clone();
        supervisor.spawn("balance-indexer-transfer", async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    batch = rx.recv() => match batch {
                        Some(batch) => balances.apply_batch(&batch),
                        None => return Ok(()),
                    }
                }
            }
        });
    }
}

/// Initialize tracing subscriber with configurable log levels.
fn init_logging(config: &IndexerConfig) -> Result<()> {
    let log_level = config.monitoring.log_level.parse().unwrap_or(tracing::Level::INFO);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("agentdex_indexer={log_level}").into());

    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    Ok(())
}
