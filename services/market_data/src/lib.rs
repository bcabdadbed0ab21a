//! # Market Data Engine
//!
//! Maintains a continuously updated multi-timeframe OHLCV cache from a
//! finest-granularity (1m) venue stream and publishes bar-close/bar-update
//! tasks into every registered task subscription.
//!
//! ## Architecture
//!
//! ```text
//! VenueFeed ──▶ run_symbol loop ──▶ SymbolCache (one mutex per symbol)
//!                                        │  fold 1m into coarser buckets
//!                                        ▼
//!                              SubscriptionRegistry ──▶ consumers
//! HistorySource ──▶ bootstrap (Semaphore + delay) ──▶ SymbolCache
//! ```
//!
//! Symbols are independent: a slow or disconnected symbol never blocks
//! ingestion or reads for another.

pub mod bootstrap;
pub mod cache;
pub mod engine;
pub mod error;
pub mod series;
pub mod symbols;
pub mod test_utils;
pub mod venue;
pub mod venues;

pub use bootstrap::{BootstrapSettings, RequestLimiter, SymbolBootstrap};
pub use cache::{CandleEvent, SymbolCache};
pub use engine::{EngineSettings, MarketDataEngine, MarketDataEngineBuilder};
pub use error::{MarketDataError, Result};
pub use series::BoundedSeries;
pub use symbols::SymbolResolver;
pub use venue::{CandleStream, HistorySource, SymbolMapping, VenueAdapters, VenueFeed};
