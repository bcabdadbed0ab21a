//! # Strategy Ownership
//!
//! Guarantees at most one instance evaluates a given strategy at a time,
//! using TTL leases in an external store.
//!
//! - [`LeaseStore`]: three atomic operations (acquire, renew, release);
//!   [`RedisLeaseStore`] runs each as one Lua script
//! - [`OwnershipService`]: this instance's identity plus a local belief set
//! - [`LeaseLoop`]: renewal and reconciliation cycles that keep the strategy
//!   engine in step with the leases actually held
//!
//! Exclusivity is bounded by the lease TTL. There is no fencing token, so a
//! paused owner may briefly overlap with its successor.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strategy_ownership::{InMemoryLeaseStore, OwnershipService};
//! use types::StrategyId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(InMemoryLeaseStore::new());
//! let a = OwnershipService::new("a", "strategy_lease", Duration::from_secs(10), store.clone());
//! let b = OwnershipService::new("b", "strategy_lease", Duration::from_secs(10), store);
//! assert!(a.acquire(StrategyId(7)).await.unwrap());
//! assert!(!b.acquire(StrategyId(7)).await.unwrap());
//! # }
//! ```

pub mod error;
pub mod lease_loop;
pub mod redis_store;
pub mod service;
pub mod store;
pub mod test_utils;

pub use error::{OwnershipError, Result};
pub use lease_loop::{
    LeaseLoop, LeaseLoopSettings, ReconcileReport, StrategyEngine, StrategyRepository,
};
pub use redis_store::RedisLeaseStore;
pub use service::{resolve_instance_id, OwnershipService};
pub use store::{InMemoryLeaseStore, LeaseStore};
