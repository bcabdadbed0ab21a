//! Rate-limited history backfill
//!
//! Every (symbol, timeframe) pair is fetched concurrently, but all requests
//! share one semaphore. A request holds its permit for the call plus a fixed
//! pause, which spaces requests without a separate token bucket. Permits are
//! RAII guards, so a failed fetch releases its slot like a successful one.

use crate::cache::SymbolCache;
use crate::error::{MarketDataError, Result};
use crate::venue::HistorySource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use types::{current_timestamp_ms, Bar, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapSettings {
    /// Bars fetched per (symbol, timeframe)
    pub cap: usize,
    pub page_size: usize,
    pub permits: usize,
    pub request_delay: Duration,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            cap: 2000,
            page_size: 1000,
            permits: 4,
            request_delay: Duration::from_millis(250),
        }
    }
}

/// Outcome of bootstrapping one symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolBootstrap {
    pub loaded: Vec<(Timeframe, usize)>,
    pub failed: Vec<Timeframe>,
}

/// Shared request limiter
#[derive(Debug, Clone)]
pub struct RequestLimiter {
    semaphore: Arc<Semaphore>,
    delay: Duration,
}

impl RequestLimiter {
    pub fn new(permits: usize, delay: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            delay,
        }
    }

    /// Run one request under a permit, then hold the permit for the delay
    pub async fn run<F, T>(&self, request: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| MarketDataError::LimiterClosed)?;
        let result = request.await;
        tokio::time::sleep(self.delay).await;
        result
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Page through history for one (symbol, timeframe) starting `cap` windows ago
pub async fn fetch_series(
    source: &dyn HistorySource,
    limiter: &RequestLimiter,
    venue_symbol: &str,
    timeframe: Timeframe,
    settings: BootstrapSettings,
) -> Result<Vec<Bar>> {
    let step = timeframe.as_millis();
    let now = current_timestamp_ms();
    let mut cursor = timeframe.bucket_start(now - settings.cap as i64 * step);
    let mut bars: Vec<Bar> = Vec::with_capacity(settings.cap.min(8192));

    while bars.len() < settings.cap {
        let limit = settings.page_size.min(settings.cap - bars.len()).max(1);
        let page = limiter
            .run(source.fetch(venue_symbol, timeframe, cursor, limit))
            .await?;

        let Some(last_ts) = page.last().map(|b| b.timestamp) else {
            break;
        };

        let before = bars.len();
        bars.extend(page.into_iter().filter(|b| b.timestamp >= cursor));
        if bars.len() == before || last_ts < cursor {
            // the source is not advancing
            break;
        }

        cursor = last_ts + step;
        if cursor > now {
            break;
        }
    }

    bars.truncate(settings.cap);
    tracing::debug!(
        "Fetched {} {} bars for {}",
        bars.len(),
        timeframe,
        venue_symbol
    );
    Ok(bars)
}

/// Backfill every timeframe of one symbol, then rebuild its live buckets
pub async fn bootstrap_symbol(
    cache: Arc<SymbolCache>,
    source: Arc<dyn HistorySource>,
    limiter: RequestLimiter,
    venue_symbol: String,
    settings: BootstrapSettings,
) -> SymbolBootstrap {
    let mut fetches = JoinSet::new();
    for &tf in cache.timeframes() {
        let source = Arc::clone(&source);
        let limiter = limiter.clone();
        let venue_symbol = venue_symbol.clone();
        fetches.spawn(async move {
            let result = fetch_series(source.as_ref(), &limiter, &venue_symbol, tf, settings).await;
            (tf, result)
        });
    }

    let mut report = SymbolBootstrap::default();
    while let Some(joined) = fetches.join_next().await {
        match joined {
            Ok((tf, Ok(bars))) => {
                report.loaded.push((tf, bars.len()));
                cache.seed_history(tf, bars);
            }
            Ok((tf, Err(e))) => {
                tracing::error!(
                    "History bootstrap failed for {} {}: {}",
                    cache.key(),
                    tf,
                    e
                );
                report.failed.push(tf);
            }
            Err(e) => tracing::error!("History bootstrap task for {} panicked: {}", cache.key(), e),
        }
    }

    cache.rebuild_live_buckets(current_timestamp_ms());
    report.loaded.sort();
    report.failed.sort();
    tracing::info!(
        "Bootstrapped {}: {} timeframes loaded, {} failed",
        cache.key(),
        report.loaded.len(),
        report.failed.len()
    );
    report
}
