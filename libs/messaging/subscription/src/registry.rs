//! Registry of active task subscriptions and fan-out publishing
//!
//! Every published task is offered to every live subscription independently;
//! a slow or full consumer only affects its own queue.

use crate::channel::{ChannelFactory, ChannelOptions, OverflowPolicy, WriteOutcome};
use crate::error::{Result, SubscriptionError};
use crate::pressure::PressureConfig;
use crate::subscription::TaskSubscription;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use types::MarketDataTask;

/// Per-publish delivery tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Skipped by a bar-close-only filter
    pub filtered: usize,
    /// Lost to an overflow policy or a closed queue
    pub dropped: usize,
}

impl PublishReport {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Enqueued | WriteOutcome::EvictedOldest => self.delivered += 1,
            _ => self.dropped += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<String, Arc<TaskSubscription>>,
    factory: ChannelFactory,
    pressure: PressureConfig,
}

impl SubscriptionRegistry {
    pub fn new(defaults: ChannelOptions, pressure: PressureConfig) -> Self {
        Self {
            subscriptions: DashMap::new(),
            factory: ChannelFactory::new(defaults),
            pressure,
        }
    }

    /// Register a consumer; `None` overrides fall back to registry defaults
    pub fn register(
        &self,
        name: &str,
        only_bar_close: bool,
        capacity: Option<usize>,
        overflow: Option<OverflowPolicy>,
    ) -> Result<Arc<TaskSubscription>> {
        match self.subscriptions.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SubscriptionError::DuplicateName(name.to_string())),
            Entry::Vacant(slot) => {
                let options = self.factory.options(capacity, overflow);
                let subscription = Arc::new(TaskSubscription::new(
                    name,
                    only_bar_close,
                    options,
                    self.pressure,
                )?);
                slot.insert(Arc::clone(&subscription));

                tracing::info!(
                    subscription = name,
                    only_bar_close,
                    capacity = ?options.capacity,
                    overflow = %options.overflow,
                    "Registered task subscription"
                );
                Ok(subscription)
            }
        }
    }

    /// Remove and close a subscription; blocked readers observe `Closed`
    pub fn unregister(&self, name: &str) -> Result<()> {
        let (_, subscription) = self
            .subscriptions
            .remove(name)
            .ok_or_else(|| SubscriptionError::NotFound(name.to_string()))?;
        subscription.close();
        tracing::info!(subscription = name, "Unregistered task subscription");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TaskSubscription>> {
        self.subscriptions.get(name).map(|s| Arc::clone(s.value()))
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscriptions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn snapshot(&self) -> Vec<Arc<TaskSubscription>> {
        self.subscriptions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Fan a task out to every subscription without waiting
    pub fn try_publish(&self, task: &MarketDataTask) -> PublishReport {
        let mut report = PublishReport::default();
        for subscription in self.snapshot() {
            if !subscription.accepts(task) {
                report.filtered += 1;
                continue;
            }
            report.record(subscription.try_write(task.clone()));
        }
        report
    }

    /// Fan a task out, waiting on subscriptions configured with `Wait`
    ///
    /// The map is snapshotted first so no shard lock is held across an await.
    pub async fn publish(&self, task: &MarketDataTask) -> PublishReport {
        let mut report = PublishReport::default();
        for subscription in self.snapshot() {
            if !subscription.accepts(task) {
                report.filtered += 1;
                continue;
            }
            report.record(subscription.write(task.clone()).await);
        }
        report
    }

    /// Close every subscription at shutdown
    pub fn close_all(&self) {
        let names = self.names();
        for name in &names {
            if let Some((_, subscription)) = self.subscriptions.remove(name) {
                subscription.close();
            }
        }
        tracing::info!("Closed {} task subscriptions", names.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Timeframe, VenueId};

    fn task(close: bool) -> MarketDataTask {
        let symbol: Arc<str> = Arc::from("ETHUSDT");
        if close {
            MarketDataTask::bar_close(VenueId::Binance, symbol, Timeframe::M5, 0)
        } else {
            MarketDataTask::bar_update(VenueId::Binance, symbol, Timeframe::M5, 0)
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = SubscriptionRegistry::default();
        registry.register("a", false, None, None).unwrap();
        assert_eq!(
            registry.register("a", true, None, None).unwrap_err(),
            SubscriptionError::DuplicateName("a".into())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_closes_queue() {
        let registry = SubscriptionRegistry::default();
        let sub = registry.register("a", false, Some(4), None).unwrap();
        registry.unregister("a").unwrap();
        assert!(sub.is_closed());
        assert!(registry.get("a").is_none());
        assert!(matches!(
            registry.unregister("a"),
            Err(SubscriptionError::NotFound(_))
        ));
    }

    #[test]
    fn test_try_publish_honors_filter() {
        let registry = SubscriptionRegistry::default();
        let all = registry.register("all", false, None, None).unwrap();
        let closes = registry.register("closes", true, None, None).unwrap();

        let report = registry.try_publish(&task(false));
        assert_eq!(
            report,
            PublishReport {
                delivered: 1,
                filtered: 1,
                dropped: 0
            }
        );
        registry.try_publish(&task(true));

        assert_eq!(all.len(), 2);
        assert_eq!(closes.len(), 1);
        assert!(closes.try_read().unwrap().is_bar_close);
    }

    #[test]
    fn test_close_all() {
        let registry = SubscriptionRegistry::default();
        let a = registry.register("a", false, None, None).unwrap();
        let b = registry.register("b", true, None, None).unwrap();
        registry.close_all();
        assert!(a.is_closed() && b.is_closed());
        assert!(registry.is_empty());
    }
}
