//! Logical symbol to venue contract resolution
//!
//! Populated once from venue metadata and read on every subscribe and fetch.
//! Unresolved symbols fall back to the venue's naming convention.

use crate::venue::SymbolMapping;
use dashmap::DashMap;
use types::VenueId;

#[derive(Debug, Default)]
pub struct SymbolResolver {
    resolved: DashMap<(VenueId, String), String>,
}

impl SymbolResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record venue metadata; returns how many mappings were stored
    pub fn load(&self, venue: VenueId, mappings: impl IntoIterator<Item = SymbolMapping>) -> usize {
        let mut count = 0;
        for mapping in mappings {
            self.resolved
                .insert((venue, canonical(&mapping.logical)), mapping.venue_symbol);
            count += 1;
        }
        count
    }

    pub fn insert(&self, venue: VenueId, logical: &str, venue_symbol: impl Into<String>) {
        self.resolved
            .insert((venue, canonical(logical)), venue_symbol.into());
    }

    /// Venue contract id for `logical`, falling back to default normalization
    pub fn resolve(&self, venue: VenueId, logical: &str) -> String {
        self.resolved
            .get(&(venue, canonical(logical)))
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| normalize(venue, logical))
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

fn canonical(logical: &str) -> String {
    logical.trim().to_ascii_uppercase()
}

/// Venue naming convention for a `BASE/QUOTE` symbol
pub fn normalize(venue: VenueId, logical: &str) -> String {
    let upper = canonical(logical);
    let mut parts = upper.split(|c| c == '/' || c == '-' || c == '_');
    let (base, quote) = match (parts.next(), parts.next()) {
        (Some(base), Some(quote)) => (base, quote),
        _ => return upper.replace(['/', '-', '_'], ""),
    };

    match venue {
        VenueId::Binance | VenueId::Bybit => format!("{base}{quote}"),
        VenueId::Okx | VenueId::Coinbase => format!("{base}-{quote}"),
        VenueId::Kraken => format!("{base}/{quote}"),
    }
}
