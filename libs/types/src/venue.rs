//! Venue identifiers and cache keys

use crate::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Centralized venues with a candle stream and history endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Binance,
    Bybit,
    Okx,
    Kraken,
    Coinbase,
}

impl VenueId {
    pub const fn label(self) -> &'static str {
        match self {
            VenueId::Binance => "binance",
            VenueId::Bybit => "bybit",
            VenueId::Okx => "okx",
            VenueId::Kraken => "kraken",
            VenueId::Coinbase => "coinbase",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VenueId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(VenueId::Binance),
            "bybit" => Ok(VenueId::Bybit),
            "okx" | "okex" => Ok(VenueId::Okx),
            "kraken" => Ok(VenueId::Kraken),
            "coinbase" => Ok(VenueId::Coinbase),
            _ => Err(TypeError::UnknownVenue(s.to_string())),
        }
    }
}

/// Logical (venue, symbol) pair identifying one symbol cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolKey {
    pub venue: VenueId,
    pub symbol: String,
}

impl SymbolKey {
    pub fn new(venue: VenueId, symbol: impl Into<String>) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_parsing() {
        assert_eq!("Binance".parse::<VenueId>().unwrap(), VenueId::Binance);
        assert_eq!("okex".parse::<VenueId>().unwrap(), VenueId::Okx);
        assert!(matches!(
            "ftx".parse::<VenueId>(),
            Err(TypeError::UnknownVenue(_))
        ));
    }

    #[test]
    fn test_symbol_key_display() {
        let key = SymbolKey::new(VenueId::Bybit, "ETH/USDT");
        assert_eq!(key.to_string(), "bybit:ETH/USDT");
    }
}
