//! Market data engine: symbol caches, ingestion loops and read accessors

use crate::bootstrap::{bootstrap_symbol, BootstrapSettings, RequestLimiter, SymbolBootstrap};
use crate::cache::SymbolCache;
use crate::error::{MarketDataError, Result};
use crate::symbols::SymbolResolver;
use crate::venue::VenueAdapters;
use futures::StreamExt;
use runtime_config::MarketDataConfig;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use task_subscription::{OverflowPolicy, PublishReport, SubscriptionRegistry, TaskSubscription};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use types::{Bar, CandleTick, MarketDataTask, SymbolKey, Timeframe, VenueId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub timeframes: Vec<Timeframe>,
    pub series_capacity: usize,
    pub reconnect_delay: Duration,
    pub bootstrap: BootstrapSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeframes: Timeframe::ALL.to_vec(),
            series_capacity: 2000,
            reconnect_delay: Duration::from_secs(5),
            bootstrap: BootstrapSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &MarketDataConfig) -> Self {
        let mut timeframes = config.timeframes.clone();
        timeframes.sort();
        timeframes.dedup();
        Self {
            timeframes,
            series_capacity: config.series_capacity,
            reconnect_delay: config.reconnect_delay(),
            bootstrap: BootstrapSettings {
                cap: config.bootstrap_cap,
                page_size: config.page_size,
                permits: config.bootstrap_permits,
                request_delay: config.bootstrap_delay(),
            },
        }
    }
}

/// Source of truth for OHLCV across all tracked symbols and timeframes
pub struct MarketDataEngine {
    settings: EngineSettings,
    venues: HashMap<VenueId, VenueAdapters>,
    // created once at construction, never resized
    caches: BTreeMap<SymbolKey, Arc<SymbolCache>>,
    resolver: Arc<SymbolResolver>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl std::fmt::Debug for MarketDataEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataEngine")
            .field("venues", &self.venues.keys().collect::<Vec<_>>())
            .field("symbols", &self.caches.len())
            .field("timeframes", &self.settings.timeframes)
            .finish()
    }
}

/// Collects venues and symbols before the cache map is frozen
#[derive(Debug)]
pub struct MarketDataEngineBuilder {
    settings: EngineSettings,
    venues: HashMap<VenueId, VenueAdapters>,
    symbols: Vec<SymbolKey>,
    resolver: Arc<SymbolResolver>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl MarketDataEngineBuilder {
    pub fn venue(mut self, adapters: VenueAdapters, symbols: &[String]) -> Self {
        let venue = adapters.venue();
        self.symbols
            .extend(symbols.iter().map(|s| SymbolKey::new(venue, s.trim())));
        self.venues.insert(venue, adapters);
        self
    }

    pub fn resolver(mut self, resolver: Arc<SymbolResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn build(self) -> MarketDataEngine {
        let caches = self
            .symbols
            .into_iter()
            .map(|key| {
                let cache = Arc::new(SymbolCache::new(
                    key.clone(),
                    &self.settings.timeframes,
                    self.settings.series_capacity,
                ));
                (key, cache)
            })
            .collect();

        MarketDataEngine {
            settings: self.settings,
            venues: self.venues,
            caches,
            resolver: self.resolver,
            subscriptions: self.subscriptions,
        }
    }
}

impl MarketDataEngine {
    pub fn builder(
        settings: EngineSettings,
        subscriptions: Arc<SubscriptionRegistry>,
    ) -> MarketDataEngineBuilder {
        MarketDataEngineBuilder {
            settings,
            venues: HashMap::new(),
            symbols: Vec::new(),
            resolver: Arc::new(SymbolResolver::new()),
            subscriptions,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &Arc<SymbolResolver> {
        &self.resolver
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    fn cache(&self, venue: VenueId, symbol: &str) -> Option<&Arc<SymbolCache>> {
        self.caches.get(&SymbolKey::new(venue, symbol))
    }

    fn adapters(&self, venue: VenueId) -> Result<&VenueAdapters> {
        self.venues
            .get(&venue)
            .ok_or(MarketDataError::UnknownVenue(venue))
    }

    // ---- ingestion ----

    /// Fold one tick into its symbol cache; the returned tasks are not yet published
    pub fn ingest(&self, venue: VenueId, symbol: &str, tick: CandleTick) -> Result<Vec<MarketDataTask>> {
        let cache = self
            .cache(venue, symbol)
            .ok_or_else(|| MarketDataError::NotTracked {
                venue,
                symbol: symbol.to_string(),
            })?;
        Ok(cache.ingest(tick.into_bar()))
    }

    /// Ingest a tick and publish the resulting tasks in emission order
    pub async fn process(&self, venue: VenueId, symbol: &str, tick: CandleTick) -> Result<usize> {
        let tasks = self.ingest(venue, symbol, tick)?;
        let mut total = PublishReport::default();
        for task in &tasks {
            let report = self.subscriptions.publish(task).await;
            total.delivered += report.delivered;
            total.dropped += report.dropped;
        }
        if total.dropped > 0 {
            tracing::debug!(
                "{}:{} candle produced {} tasks, {} deliveries dropped",
                venue,
                symbol,
                tasks.len(),
                total.dropped
            );
        }
        Ok(tasks.len())
    }

    /// Long-lived ingestion loop for one symbol; exits only on cancellation
    pub async fn run_symbol(self: Arc<Self>, key: SymbolKey, cancel: CancellationToken) {
        let feed = match self.adapters(key.venue) {
            Ok(adapters) => Arc::clone(&adapters.feed),
            Err(e) => {
                tracing::error!("Cannot start ingestion for {}: {}", key, e);
                return;
            }
        };
        let venue_symbol = self.resolver.resolve(key.venue, &key.symbol);

        loop {
            let subscribed = tokio::select! {
                _ = cancel.cancelled() => break,
                result = feed.subscribe(&venue_symbol) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    tracing::info!("Streaming {} candles as {}", key, venue_symbol);
                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => {
                                tracing::info!("Ingestion for {} stopped", key);
                                return;
                            }
                            next = stream.next() => next,
                        };
                        match next {
                            Some(Ok(tick)) => {
                                // a full Wait-policy queue must not pin the loop past shutdown
                                let processed = tokio::select! {
                                    _ = cancel.cancelled() => {
                                        tracing::info!("Ingestion for {} stopped while publishing", key);
                                        return;
                                    }
                                    processed = self.process(key.venue, &key.symbol, tick) => processed,
                                };
                                if let Err(e) = processed {
                                    tracing::error!("Failed to ingest candle for {}: {}", key, e);
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!("Stream error for {}: {}", key, e);
                                break;
                            }
                            None => {
                                tracing::warn!("Stream for {} ended", key);
                                break;
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Subscribe failed for {}: {}", key, e),
            }

            tracing::info!(
                "Reconnecting {} in {:?}",
                key,
                self.settings.reconnect_delay
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }

        tracing::info!("Ingestion for {} stopped", key);
    }

    /// Spawn one ingestion loop per tracked symbol
    pub fn spawn_ingestion(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.caches
            .keys()
            .cloned()
            .map(|key| tokio::spawn(Arc::clone(self).run_symbol(key, cancel.child_token())))
            .collect()
    }

    // ---- bootstrap ----

    /// Populate the resolver from venue metadata; failures fall back to
    /// default normalization
    pub async fn resolve_symbols(&self) {
        for (venue, adapters) in &self.venues {
            match adapters.history.symbols().await {
                Ok(mappings) => {
                    let stored = self.resolver.load(*venue, mappings);
                    tracing::info!("Loaded {} symbol mappings for {}", stored, venue);
                }
                Err(e) => tracing::warn!(
                    "Symbol metadata unavailable for {}, using default naming: {}",
                    venue,
                    e
                ),
            }
        }
    }

    /// Backfill history for every tracked (symbol, timeframe) under one limiter.
    ///
    /// Failed pairs are logged and skipped.
    pub async fn bootstrap(&self) -> BTreeMap<SymbolKey, SymbolBootstrap> {
        let settings = self.settings.bootstrap;
        let limiter = RequestLimiter::new(settings.permits, settings.request_delay);
        let mut symbols = JoinSet::new();

        for (key, cache) in &self.caches {
            let history = match self.adapters(key.venue) {
                Ok(adapters) => Arc::clone(&adapters.history),
                Err(e) => {
                    tracing::error!("Skipping bootstrap for {}: {}", key, e);
                    continue;
                }
            };
            let venue_symbol = self.resolver.resolve(key.venue, &key.symbol);
            let key = key.clone();
            let cache = Arc::clone(cache);
            let limiter = limiter.clone();
            symbols.spawn(async move {
                let report =
                    bootstrap_symbol(cache, history, limiter, venue_symbol, settings).await;
                (key, report)
            });
        }

        let mut reports = BTreeMap::new();
        while let Some(joined) = symbols.join_next().await {
            match joined {
                Ok((key, report)) => {
                    reports.insert(key, report);
                }
                Err(e) => tracing::error!("Bootstrap task panicked: {}", e),
            }
        }
        reports
    }

    // ---- read accessors ----

    /// Current bucket if present, else the last closed bar
    pub fn get_latest(&self, venue: VenueId, timeframe: Timeframe, symbol: &str) -> Option<Bar> {
        self.cache(venue, symbol)?.latest(timeframe)
    }

    /// Up to `count` bars ending at or before `end_cutoff`, oldest first
    pub fn get_history(
        &self,
        venue: VenueId,
        timeframe: Timeframe,
        symbol: &str,
        end_cutoff: Option<i64>,
        count: usize,
    ) -> Vec<Bar> {
        self.cache(venue, symbol)
            .map(|cache| cache.history(timeframe, end_cutoff, count))
            .unwrap_or_default()
    }

    pub fn tracked_symbols(&self) -> Vec<SymbolKey> {
        self.caches.keys().cloned().collect()
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.settings.timeframes
    }

    pub fn series_len(&self, venue: VenueId, timeframe: Timeframe, symbol: &str) -> usize {
        self.cache(venue, symbol)
            .map_or(0, |cache| cache.series_len(timeframe))
    }

    // ---- subscriptions ----

    pub fn register_subscription(
        &self,
        name: &str,
        only_bar_close: bool,
        capacity: Option<usize>,
        overflow: Option<OverflowPolicy>,
    ) -> Result<Arc<TaskSubscription>> {
        Ok(self
            .subscriptions
            .register(name, only_bar_close, capacity, overflow)?)
    }

    pub fn unregister_subscription(&self, name: &str) -> Result<()> {
        Ok(self.subscriptions.unregister(name)?)
    }
}
