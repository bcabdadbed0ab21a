//! Ownership error types

use thiserror::Error;
use types::StrategyId;

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("Redis lease store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Lease store unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected lease store reply for {key}: {reply}")]
    UnexpectedReply { key: String, reply: i64 },

    #[error("Strategy {id} could not be loaded: {reason}")]
    Repository { id: StrategyId, reason: String },

    #[error("Strategy engine rejected {id}: {reason}")]
    Engine { id: StrategyId, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OwnershipError {
    /// Store failures are retried on the next cycle; the others need attention
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OwnershipError::Store(_)
                | OwnershipError::Unavailable(_)
                | OwnershipError::Repository { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OwnershipError>;
