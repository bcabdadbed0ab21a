//! Lease store seam and an in-process implementation
//!
//! A lease is `key -> (owner, expiry)`. All three operations are atomic with
//! respect to each other; an expired lease behaves exactly like a missing one.

use crate::error::{OwnershipError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Set `owner` with `ttl` if free; refresh if already held by `owner`;
    /// never overwrite another owner
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Extend the lease only while `owner` still holds it
    async fn try_renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Delete the lease only if `owner` holds it
    async fn try_release(&self, key: &str, owner: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

/// Lease store backed by a process-local map.
///
/// Shared through an `Arc` it stands in for the external store when several
/// ownership services run in one process. Expiry follows the tokio clock.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: Mutex<HashMap<String, Lease>>,
    unavailable: AtomicBool,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current live owner of `key`
    pub fn owner_of(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.leases
            .lock()
            .get(key)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.owner.clone())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OwnershipError::Unavailable(
                "in-memory lease store switched off".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut leases = self.leases.lock();
        match leases.get_mut(key) {
            Some(lease) if lease.expires_at > now && lease.owner != owner => Ok(false),
            Some(lease) => {
                lease.owner = owner.to_string();
                lease.expires_at = now + ttl;
                Ok(true)
            }
            None => {
                leases.insert(
                    key.to_string(),
                    Lease {
                        owner: owner.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn try_renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut leases = self.leases.lock();
        match leases.get_mut(key) {
            Some(lease) if lease.expires_at > now && lease.owner == owner => {
                lease.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn try_release(&self, key: &str, owner: &str) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut leases = self.leases.lock();
        let held = leases
            .get(key)
            .is_some_and(|lease| lease.expires_at > now && lease.owner == owner);
        if held {
            leases.remove(key);
        }
        Ok(held)
    }
}
