//! Venue adapter seams: live candle feed and paged history
//!
//! Symbols passed to these traits are venue contract identifiers (already
//! resolved through [`crate::SymbolResolver`]).

use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use types::{Bar, CandleTick, Timeframe, VenueId};

/// Finest-timeframe candles for one symbol. Transport failures end the
/// stream with an `Err`; unparseable frames are skipped by the adapter.
pub type CandleStream = BoxStream<'static, Result<CandleTick>>;

/// Logical symbol to venue contract identifier, as reported by the venue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMapping {
    /// e.g. `BTC/USDT`
    pub logical: String,
    /// e.g. `BTCUSDT`
    pub venue_symbol: String,
}

#[async_trait]
pub trait VenueFeed: Send + Sync {
    fn venue(&self) -> VenueId;

    /// Open a finest-timeframe candle stream; reconnecting is the caller's job
    async fn subscribe(&self, symbol: &str) -> Result<CandleStream>;
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    fn venue(&self) -> VenueId;

    /// Up to `limit` bars starting at `since_ms`, oldest first
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Bar>>;

    /// Instrument metadata for symbol resolution; empty when unsupported
    async fn symbols(&self) -> Result<Vec<SymbolMapping>> {
        Ok(Vec::new())
    }
}

/// Feed and history endpoint for one venue
#[derive(Clone)]
pub struct VenueAdapters {
    pub feed: Arc<dyn VenueFeed>,
    pub history: Arc<dyn HistorySource>,
}

impl VenueAdapters {
    pub fn new(feed: Arc<dyn VenueFeed>, history: Arc<dyn HistorySource>) -> Self {
        Self { feed, history }
    }

    pub fn venue(&self) -> VenueId {
        self.feed.venue()
    }
}

impl std::fmt::Debug for VenueAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueAdapters")
            .field("venue", &self.venue())
            .finish()
    }
}
