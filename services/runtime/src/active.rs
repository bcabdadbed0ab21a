//! Active strategy set and the evaluation trigger consumer

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use strategy_ownership::{Result, StrategyEngine};
use task_subscription::{SubscriptionError, TaskSubscription};
use tokio_util::sync::CancellationToken;
use types::{StrategyDefinition, StrategyId};

/// Strategies this instance currently evaluates
#[derive(Debug, Default)]
pub struct ActiveStrategies {
    strategies: DashMap<StrategyId, StrategyDefinition>,
}

impl ActiveStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn contains(&self, id: StrategyId) -> bool {
        self.strategies.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<StrategyId> {
        let mut ids: Vec<StrategyId> = self.strategies.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl StrategyEngine for ActiveStrategies {
    async fn upsert(&self, definition: StrategyDefinition) -> Result<()> {
        let id = definition.id;
        if self.strategies.insert(id, definition).is_some() {
            tracing::info!("Strategy {} reloaded", id);
        } else {
            tracing::info!("Strategy {} loaded", id);
        }
        Ok(())
    }

    async fn remove(&self, id: StrategyId) -> Result<()> {
        if self.strategies.remove(&id).is_some() {
            tracing::info!("Strategy {} unloaded", id);
        }
        Ok(())
    }
}

/// Drain a subscription and emit one evaluation trigger per task and
/// loaded strategy; returns the number of tasks consumed
pub async fn run_evaluation_consumer(
    subscription: Arc<TaskSubscription>,
    strategies: Arc<ActiveStrategies>,
    cancel: CancellationToken,
) -> u64 {
    let mut consumed = 0u64;
    loop {
        match subscription.read(&cancel).await {
            Ok(task) => {
                consumed += 1;
                for id in strategies.ids() {
                    tracing::debug!("Evaluation trigger for strategy {} on {}", id, task);
                }
            }
            Err(SubscriptionError::Cancelled) | Err(SubscriptionError::Closed) => break,
            Err(e) => {
                tracing::warn!("Subscription {} read failed: {}", subscription.name(), e);
                break;
            }
        }
    }
    tracing::info!(
        "Consumer {} stopped after {} tasks",
        subscription.name(),
        consumed
    );
    consumed
}
