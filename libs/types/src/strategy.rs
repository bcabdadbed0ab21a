//! Strategy identifiers and persisted definitions

use crate::TypeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database identifier of a user strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(pub i64);

impl StrategyId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StrategyId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(StrategyId)
            .map_err(|_| TypeError::InvalidStrategyId(s.to_string()))
    }
}

impl From<i64> for StrategyId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Persisted strategy as read from the strategy store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: StrategyId,
    /// Opaque strategy body; interpreted only by the evaluation engine
    pub content: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default = "default_runnable")]
    pub is_runnable: bool,
}

fn default_runnable() -> bool {
    true
}

impl StrategyDefinition {
    /// True when a hot reload is needed to move from `self` to `newer`
    pub fn differs_from(&self, newer: &StrategyDefinition) -> bool {
        self.content != newer.content || self.last_modified != newer.last_modified
    }
}
