#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Subscription '{0}' is already registered")]
    DuplicateName(String),

    #[error("Subscription '{0}' not found")]
    NotFound(String),

    #[error("Queue full ({capacity} items), task rejected")]
    Rejected { capacity: usize },

    #[error("Subscription closed")]
    Closed,

    #[error("Read cancelled")]
    Cancelled,

    #[error("Unknown overflow policy: '{0}'")]
    UnknownPolicy(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SubscriptionError {
    /// Check if the caller may retry the same operation later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SubscriptionError::Rejected { .. })
    }

    /// Check if the subscription is gone for good
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionError::Closed | SubscriptionError::NotFound(_)
        )
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SubscriptionError::InvalidConfig(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SubscriptionError>;
