//! Strategy ownership service
//!
//! Wraps a [`LeaseStore`] with this instance's identity and keeps a local
//! belief set of the strategy ids it thinks it owns. The belief set is
//! advisory: the store is the only authority, and a belief can be stale for
//! up to one renewal interval.

use crate::error::Result;
use crate::redis_store::RedisLeaseStore;
use crate::store::LeaseStore;
use dashmap::DashSet;
use runtime_config::OwnershipConfig;
use std::sync::Arc;
use std::time::Duration;
use types::StrategyId;
use uuid::Uuid;

pub struct OwnershipService {
    instance_id: String,
    key_prefix: String,
    ttl: Duration,
    // None when ownership is disabled
    store: Option<Arc<dyn LeaseStore>>,
    owned: DashSet<StrategyId>,
}

impl std::fmt::Debug for OwnershipService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipService")
            .field("instance_id", &self.instance_id)
            .field("enabled", &self.is_enabled())
            .field("owned", &self.owned.len())
            .finish()
    }
}

impl OwnershipService {
    pub fn new(
        instance_id: impl Into<String>,
        key_prefix: impl Into<String>,
        ttl: Duration,
        store: Arc<dyn LeaseStore>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            key_prefix: key_prefix.into(),
            ttl,
            store: Some(store),
            owned: DashSet::new(),
        }
    }

    /// Single-instance mode: every operation succeeds locally
    pub fn disabled(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            key_prefix: String::new(),
            ttl: Duration::ZERO,
            store: None,
            owned: DashSet::new(),
        }
    }

    /// Build from configuration, connecting to Redis only when enabled
    pub async fn from_config(config: &OwnershipConfig) -> Result<Self> {
        let instance_id = resolve_instance_id(config.instance_id.as_deref());
        if !config.enabled {
            return Ok(Self::disabled(instance_id));
        }
        let store = RedisLeaseStore::connect(&config.redis_url).await?;
        Ok(Self::new(
            instance_id,
            config.key_prefix.clone(),
            config.lease_ttl(),
            Arc::new(store),
        ))
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn lease_key(&self, id: StrategyId) -> String {
        format!("{}:{}", self.key_prefix, id)
    }

    pub async fn acquire(&self, id: StrategyId) -> Result<bool> {
        let Some(store) = &self.store else {
            self.owned.insert(id);
            return Ok(true);
        };
        let acquired = store
            .try_acquire(&self.lease_key(id), &self.instance_id, self.ttl)
            .await?;
        if acquired {
            self.owned.insert(id);
        } else {
            self.owned.remove(&id);
        }
        Ok(acquired)
    }

    /// `false` means the lease was lost and the belief has been dropped
    pub async fn renew(&self, id: StrategyId) -> Result<bool> {
        let Some(store) = &self.store else {
            self.owned.insert(id);
            return Ok(true);
        };
        let renewed = store
            .try_renew(&self.lease_key(id), &self.instance_id, self.ttl)
            .await?;
        if !renewed {
            self.owned.remove(&id);
        }
        Ok(renewed)
    }

    /// The belief is dropped even when the store call fails
    pub async fn release(&self, id: StrategyId) -> Result<bool> {
        self.owned.remove(&id);
        match &self.store {
            Some(store) => store.try_release(&self.lease_key(id), &self.instance_id).await,
            None => Ok(true),
        }
    }

    /// Drop a belief without touching the store
    pub fn forget(&self, id: StrategyId) {
        self.owned.remove(&id);
    }

    pub fn owns(&self, id: StrategyId) -> bool {
        self.owned.contains(&id)
    }

    /// Sorted snapshot of the belief set
    pub fn owned(&self) -> Vec<StrategyId> {
        let mut ids: Vec<StrategyId> = self.owned.iter().map(|id| *id).collect();
        ids.sort();
        ids
    }

    /// Release every believed lease; returns how many the store confirmed
    pub async fn release_all(&self) -> usize {
        let mut released = 0;
        for id in self.owned() {
            match self.release(id).await {
                Ok(true) => released += 1,
                Ok(false) => tracing::debug!("Lease for strategy {} was already gone", id),
                Err(e) => tracing::warn!("Failed to release lease for strategy {}: {}", id, e),
            }
        }
        released
    }
}

/// Configured id, else `hostname-uuid`
pub fn resolve_instance_id(configured: Option<&str>) -> String {
    match configured.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => format!("{}-{}", hostname(), Uuid::new_v4()),
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "meridian".to_string())
}
