//! Error types for the market data engine and venue adapters

use thiserror::Error;
use types::VenueId;

/// Result type alias for market data operations
pub type Result<T> = std::result::Result<T, MarketDataError>;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("Connection failed for venue {venue}: {reason}")]
    ConnectionFailed { venue: VenueId, reason: String },

    #[error("Connection timeout for venue {venue} after {timeout_ms}ms")]
    ConnectionTimeout { venue: VenueId, timeout_ms: u64 },

    #[error("Connection closed by venue {venue}: {reason:?}")]
    ConnectionClosed {
        venue: VenueId,
        reason: Option<String>,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP request to venue {venue} failed: {reason}")]
    Http { venue: VenueId, reason: String },

    #[error("Rate limit exceeded for venue {venue}")]
    RateLimited { venue: VenueId },

    /// Parse error from venue data
    #[error("Parse error for venue {venue}: {message} - {error}")]
    ParseError {
        venue: VenueId,
        message: String,
        error: String,
    },

    #[error("Symbol {symbol} is not tracked on venue {venue}")]
    NotTracked { venue: VenueId, symbol: String },

    #[error("No adapters registered for venue {0}")]
    UnknownVenue(VenueId),

    #[error("Bootstrap limiter closed")]
    LimiterClosed,

    #[error(transparent)]
    Subscription(#[from] task_subscription::SubscriptionError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MarketDataError {
    /// Check if retrying after a delay can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MarketDataError::ConnectionFailed { .. }
                | MarketDataError::ConnectionTimeout { .. }
                | MarketDataError::ConnectionClosed { .. }
                | MarketDataError::WebSocket(_)
                | MarketDataError::Http { .. }
                | MarketDataError::RateLimited { .. }
        )
    }

    /// Venue the error originated from, when known
    pub fn venue(&self) -> Option<VenueId> {
        match self {
            MarketDataError::ConnectionFailed { venue, .. }
            | MarketDataError::ConnectionTimeout { venue, .. }
            | MarketDataError::ConnectionClosed { venue, .. }
            | MarketDataError::Http { venue, .. }
            | MarketDataError::RateLimited { venue }
            | MarketDataError::ParseError { venue, .. }
            | MarketDataError::NotTracked { venue, .. } => Some(*venue),
            MarketDataError::UnknownVenue(venue) => Some(*venue),
            _ => None,
        }
    }

    pub fn parse(venue: VenueId, message: impl Into<String>, error: impl ToString) -> Self {
        MarketDataError::ParseError {
            venue,
            message: message.into(),
            error: error.to_string(),
        }
    }
}
