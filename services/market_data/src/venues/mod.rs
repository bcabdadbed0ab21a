//! Concrete venue adapters

pub mod binance;

pub use binance::{BinanceFeed, BinanceHistory};

use crate::error::{MarketDataError, Result};
use crate::venue::VenueAdapters;
use runtime_config::MarketDataConfig;
use std::sync::Arc;
use types::VenueId;

/// Build the adapters for the configured venue
pub fn adapters_for(config: &MarketDataConfig) -> Result<VenueAdapters> {
    match config.venue {
        VenueId::Binance => Ok(VenueAdapters::new(
            Arc::new(BinanceFeed::new(config.ws_url.clone(), config.connect_timeout())),
            Arc::new(BinanceHistory::new(config.rest_url.clone())),
        )),
        other => Err(MarketDataError::Configuration(format!(
            "no adapter implemented for venue {other}"
        ))),
    }
}
