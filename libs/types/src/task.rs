//! Market data events delivered to subscriptions

use crate::{Timeframe, VenueId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A bar-close or bar-update notification for one (venue, symbol, timeframe)
///
/// The symbol is reference counted so fan-out to many subscriptions only
/// bumps a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketDataTask {
    pub venue: VenueId,
    pub symbol: Arc<str>,
    pub timeframe: Timeframe,
    /// Aligned window start of the affected bar
    pub candle_timestamp: i64,
    pub is_bar_close: bool,
}

impl MarketDataTask {
    pub fn bar_close(venue: VenueId, symbol: Arc<str>, timeframe: Timeframe, ts: i64) -> Self {
        Self {
            venue,
            symbol,
            timeframe,
            candle_timestamp: ts,
            is_bar_close: true,
        }
    }

    pub fn bar_update(venue: VenueId, symbol: Arc<str>, timeframe: Timeframe, ts: i64) -> Self {
        Self {
            venue,
            symbol,
            timeframe,
            candle_timestamp: ts,
            is_bar_close: false,
        }
    }
}

impl fmt::Display for MarketDataTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{} {} {}",
            self.venue,
            self.symbol,
            self.timeframe,
            self.candle_timestamp,
            if self.is_bar_close { "close" } else { "update" }
        )
    }
}
