//! # Meridian Shared Types
//!
//! Value types shared by every Meridian crate: OHLCV bars, timeframes, venue
//! identifiers, market data tasks and strategy identifiers.
//!
//! ## Design Philosophy
//!
//! - **Tolerant numerics**: bar fields are `Option<Decimal>` so partial venue
//!   payloads never abort ingestion; folding coalesces missing values
//! - **Aligned windows**: every bar timestamp is the aligned window start in
//!   milliseconds since the Unix epoch
//! - **Small and `Copy` where possible**: tasks and ids are cheap to fan out
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Bar, Timeframe};
//! use rust_decimal::Decimal;
//!
//! let tf: Timeframe = "15m".parse().unwrap();
//! assert_eq!(tf.bucket_start(1_000_000), 900_000);
//!
//! let bar = Bar::flat(0, Decimal::ONE, Decimal::TEN);
//! assert_eq!(bar.close, Some(Decimal::ONE));
//! ```

pub mod bar;
pub mod errors;
pub mod strategy;
pub mod task;
pub mod time;
pub mod timeframe;
pub mod venue;

pub use bar::{Bar, CandleTick};
pub use errors::TypeError;
pub use strategy::{StrategyDefinition, StrategyId};
pub use task::MarketDataTask;
pub use time::current_timestamp_ms;
pub use timeframe::Timeframe;
pub use venue::{SymbolKey, VenueId};
