//! Service wiring: engine, subscriptions, strategy leases and shutdown

use crate::active::{run_evaluation_consumer, ActiveStrategies};
use crate::repository::FileStrategyRepository;
use anyhow::{Context, Result};
use market_data::{EngineSettings, MarketDataEngine};
use runtime_config::{MeridianConfig, SubscriptionsConfig};
use std::future::Future;
use std::sync::Arc;
use strategy_ownership::{LeaseLoop, LeaseLoopSettings, OwnershipService};
use task_subscription::{ChannelOptions, OverflowPolicy, PressureConfig, SubscriptionRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Name of the built-in subscription feeding strategy evaluation
pub const EVALUATION_SUBSCRIPTION: &str = "strategy-evaluation";

/// Subscription defaults from the `[subscriptions]` section
pub fn build_registry(config: &SubscriptionsConfig) -> Result<SubscriptionRegistry> {
    let overflow: OverflowPolicy = config
        .overflow_policy
        .parse()
        .context("Invalid subscriptions.overflow_policy")?;
    let defaults = match config.default_capacity {
        Some(capacity) => ChannelOptions::bounded(capacity, overflow),
        None => ChannelOptions::unbounded(),
    };
    defaults
        .validate()
        .context("Invalid subscriptions.default_capacity")?;

    let pressure = PressureConfig {
        threshold_percent: config.warn_threshold_percent,
        min_interval: config.warn_interval(),
    };
    Ok(SubscriptionRegistry::new(defaults, pressure))
}

/// Run the service until `shutdown` resolves
pub async fn run(config: MeridianConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    tokio::pin!(shutdown);

    let registry = Arc::new(build_registry(&config.subscriptions)?);
    let adapters = market_data::venues::adapters_for(&config.market_data)
        .context("Failed to build venue adapters")?;
    let engine = Arc::new(
        MarketDataEngine::builder(
            EngineSettings::from_config(&config.market_data),
            Arc::clone(&registry),
        )
        .venue(adapters, &config.market_data.symbols)
        .build(),
    );
    info!(
        "Tracking {} symbols on {} across {} timeframes",
        engine.tracked_symbols().len(),
        config.market_data.venue,
        engine.timeframes().len()
    );

    engine.resolve_symbols().await;
    let reports = tokio::select! {
        reports = engine.bootstrap() => reports,
        _ = &mut shutdown => {
            info!("Shutdown requested during bootstrap");
            return Ok(());
        }
    };
    let failed: usize = reports.values().map(|r| r.failed.len()).sum();
    if failed > 0 {
        warn!("History bootstrap incomplete: {} (symbol, timeframe) pairs failed", failed);
    }

    let cancel = CancellationToken::new();
    let ingestion = engine.spawn_ingestion(&cancel);

    let strategies = Arc::new(ActiveStrategies::new());
    let subscription = engine
        .register_subscription(EVALUATION_SUBSCRIPTION, true, None, None)
        .context("Failed to register evaluation subscription")?;
    let consumer = tokio::spawn(run_evaluation_consumer(
        subscription,
        Arc::clone(&strategies),
        cancel.child_token(),
    ));

    let ownership = Arc::new(
        OwnershipService::from_config(&config.ownership)
            .await
            .context("Failed to initialize strategy ownership")?,
    );
    info!(
        "Instance {} (ownership {})",
        ownership.instance_id(),
        if ownership.is_enabled() { "enabled" } else { "disabled" }
    );
    let repository = Arc::new(FileStrategyRepository::new(
        config.strategies.definitions_dir.clone(),
    ));
    let lease_loop = Arc::new(LeaseLoop::new(
        Arc::clone(&ownership),
        repository,
        strategies.clone(),
        LeaseLoopSettings::from_config(&config.ownership),
    ));
    let leases = tokio::spawn(Arc::clone(&lease_loop).run(cancel.child_token()));

    info!("Meridian running. Press Ctrl+C to stop.");
    shutdown.await;
    info!("Shutting down");

    cancel.cancel();
    if let Err(e) = leases.await {
        error!("Lease loop panicked: {}", e);
    }
    // the disabled path returns early and leaves its local beliefs behind
    let released = ownership.release_all().await;
    if released > 0 {
        info!("Released {} remaining leases", released);
    }

    registry.close_all();
    for handle in ingestion {
        if let Err(e) = handle.await {
            error!("Ingestion task panicked: {}", e);
        }
    }
    match consumer.await {
        Ok(consumed) => info!("Evaluation consumer handled {} tasks", consumed),
        Err(e) => error!("Evaluation consumer panicked: {}", e),
    }

    info!("Meridian stopped");
    Ok(())
}
