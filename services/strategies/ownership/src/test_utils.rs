//! In-memory strategy repository and engine for tests and local runs

use crate::error::{OwnershipError, Result};
use crate::lease_loop::{StrategyEngine, StrategyRepository};
use crate::store::LeaseStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use types::{StrategyDefinition, StrategyId};

/// Definition whose `last_modified` is derived from its content length
pub fn definition(id: i64, content: &str, runnable: bool) -> StrategyDefinition {
    let modified = Utc
        .timestamp_opt(1_700_000_000 + content.len() as i64, 0)
        .single()
        .unwrap_or_else(Utc::now);
    StrategyDefinition {
        id: StrategyId(id),
        content: content.to_string(),
        last_modified: modified,
        is_runnable: runnable,
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    definitions: Mutex<BTreeMap<StrategyId, StrategyDefinition>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, definition: StrategyDefinition) {
        self.definitions.lock().insert(definition.id, definition);
    }

    pub fn remove(&self, id: StrategyId) {
        self.definitions.lock().remove(&id);
    }
}

#[async_trait]
impl StrategyRepository for MemoryRepository {
    async fn runnable_ids(&self) -> Result<Vec<StrategyId>> {
        Ok(self
            .definitions
            .lock()
            .values()
            .filter(|d| d.is_runnable)
            .map(|d| d.id)
            .collect())
    }

    async fn definition(&self, id: StrategyId) -> Result<Option<StrategyDefinition>> {
        Ok(self.definitions.lock().get(&id).cloned())
    }
}

/// Engine that records what is loaded
#[derive(Debug, Default)]
pub struct RecordingEngine {
    active: Mutex<BTreeMap<StrategyId, StrategyDefinition>>,
    rejected: Mutex<HashSet<StrategyId>>,
    upserts: Mutex<usize>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert of `id` fail
    pub fn reject(&self, id: StrategyId) {
        self.rejected.lock().insert(id);
    }

    pub fn active(&self) -> Vec<StrategyId> {
        self.active.lock().keys().copied().collect()
    }

    pub fn content(&self, id: StrategyId) -> Option<String> {
        self.active.lock().get(&id).map(|d| d.content.clone())
    }

    pub fn upserts(&self) -> usize {
        *self.upserts.lock()
    }
}

#[async_trait]
impl StrategyEngine for RecordingEngine {
    async fn upsert(&self, definition: StrategyDefinition) -> Result<()> {
        *self.upserts.lock() += 1;
        if self.rejected.lock().contains(&definition.id) {
            return Err(OwnershipError::Engine {
                id: definition.id,
                reason: "rejected".into(),
            });
        }
        self.active.lock().insert(definition.id, definition);
        Ok(())
    }

    async fn remove(&self, id: StrategyId) -> Result<()> {
        self.active.lock().remove(&id);
        Ok(())
    }
}

/// Lease store that sleeps before every operation, for slow-backend tests
pub struct DelayedLeaseStore {
    inner: Arc<dyn LeaseStore>,
    delay: Duration,
    calls: AtomicUsize,
}

impl DelayedLeaseStore {
    pub fn new(inner: Arc<dyn LeaseStore>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    /// Operations started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl LeaseStore for DelayedLeaseStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.pause().await;
        self.inner.try_acquire(key, owner, ttl).await
    }

    async fn try_renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.pause().await;
        self.inner.try_renew(key, owner, ttl).await
    }

    async fn try_release(&self, key: &str, owner: &str) -> Result<bool> {
        self.pause().await;
        self.inner.try_release(key, owner).await
    }
}
