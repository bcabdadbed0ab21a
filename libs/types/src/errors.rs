//! Error types for parsing shared identifiers

use thiserror::Error;

/// Errors raised while parsing or validating shared value types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Timeframe label not in the supported set
    #[error("Unknown timeframe: '{0}'")]
    UnknownTimeframe(String),

    /// Venue label not in the supported set
    #[error("Unknown venue: '{0}'")]
    UnknownVenue(String),

    /// Strategy id could not be parsed
    #[error("Invalid strategy id: '{0}'")]
    InvalidStrategyId(String),
}
