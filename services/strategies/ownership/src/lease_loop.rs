//! Strategy runtime lease loop
//!
//! Two cycles share one task:
//! - **renewal** (short interval): renew every owned lease, unloading any
//!   strategy whose lease was lost or could not be confirmed
//! - **reconciliation** (long interval): drop owned strategies that are gone
//!   or no longer runnable, hot-reload changed ones, then try to acquire
//!   every runnable strategy nobody here owns yet
//!
//! A strategy is loaded into the engine only while its lease is believed
//! held. Losing the lease always unloads before anything else happens.

use crate::error::Result;
use crate::service::OwnershipService;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use types::{StrategyDefinition, StrategyId};

/// Read side of strategy persistence
#[async_trait]
pub trait StrategyRepository: Send + Sync {
    async fn runnable_ids(&self) -> Result<Vec<StrategyId>>;

    /// `None` when the strategy no longer exists
    async fn definition(&self, id: StrategyId) -> Result<Option<StrategyDefinition>>;
}

/// The set of strategies actively evaluated by this instance
#[async_trait]
pub trait StrategyEngine: Send + Sync {
    /// Load or hot-reload
    async fn upsert(&self, definition: StrategyDefinition) -> Result<()>;

    async fn remove(&self, id: StrategyId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseLoopSettings {
    pub renew_interval: Duration,
    pub reconcile_interval: Duration,
}

impl Default for LeaseLoopSettings {
    fn default() -> Self {
        Self {
            renew_interval: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(30),
        }
    }
}

impl LeaseLoopSettings {
    pub fn from_config(config: &runtime_config::OwnershipConfig) -> Self {
        Self {
            renew_interval: config.renew_interval(),
            reconcile_interval: config.reconcile_interval(),
        }
    }
}

/// What one reconciliation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub acquired: usize,
    pub reloaded: usize,
    pub released: usize,
    /// Runnable strategies held by another instance
    pub contended: usize,
}

pub struct LeaseLoop {
    ownership: Arc<OwnershipService>,
    repository: Arc<dyn StrategyRepository>,
    engine: Arc<dyn StrategyEngine>,
    settings: LeaseLoopSettings,
    // definitions currently handed to the engine, for change detection
    loaded: Mutex<HashMap<StrategyId, StrategyDefinition>>,
}

impl std::fmt::Debug for LeaseLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLoop")
            .field("ownership", &self.ownership)
            .field("settings", &self.settings)
            .field("loaded", &self.loaded.lock().len())
            .finish()
    }
}

impl LeaseLoop {
    pub fn new(
        ownership: Arc<OwnershipService>,
        repository: Arc<dyn StrategyRepository>,
        engine: Arc<dyn StrategyEngine>,
        settings: LeaseLoopSettings,
    ) -> Self {
        Self {
            ownership,
            repository,
            engine,
            settings,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn ownership(&self) -> &Arc<OwnershipService> {
        &self.ownership
    }

    /// Ids currently loaded into the engine, sorted
    pub fn loaded(&self) -> Vec<StrategyId> {
        let mut ids: Vec<StrategyId> = self.loaded.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Run until cancelled, then release and unload everything.
    ///
    /// With ownership disabled this loads every runnable strategy once and
    /// returns immediately.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if !self.ownership.is_enabled() {
            tracing::info!(
                "Strategy ownership disabled, loading all runnable strategies locally as {}",
                self.ownership.instance_id()
            );
            let report = self.reconcile_cycle(&cancel).await;
            tracing::info!("Loaded {} strategies", report.acquired);
            return;
        }

        tracing::info!(
            "Lease loop started for {} (renew every {:?}, reconcile every {:?})",
            self.ownership.instance_id(),
            self.settings.renew_interval,
            self.settings.reconcile_interval
        );

        let mut renew = tokio::time::interval(self.settings.renew_interval);
        renew.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconcile = tokio::time::interval(self.settings.reconcile_interval);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = renew.tick() => {
                    self.renew_cycle(&cancel).await;
                }
                _ = reconcile.tick() => {
                    let report = self.reconcile_cycle(&cancel).await;
                    if report != ReconcileReport::default() {
                        tracing::info!(
                            "Reconciled strategies: {} acquired, {} reloaded, {} released, {} held elsewhere",
                            report.acquired,
                            report.reloaded,
                            report.released,
                            report.contended
                        );
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Renew every owned lease; returns how many were lost.
    ///
    /// Stops between strategies once `cancel` fires.
    pub async fn renew_cycle(&self, cancel: &CancellationToken) -> usize {
        let mut lost = 0;
        for id in self.ownership.owned() {
            if cancel.is_cancelled() {
                break;
            }
            match self.ownership.renew(id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!("Lease for strategy {} lost, unloading", id);
                    self.unload(id).await;
                    self.release_best_effort(id).await;
                    lost += 1;
                }
                Err(e) => {
                    // ownership cannot be confirmed, so treat it as lost
                    tracing::warn!("Could not renew lease for strategy {}, unloading: {}", id, e);
                    self.unload(id).await;
                    self.ownership.forget(id);
                    self.release_best_effort(id).await;
                    lost += 1;
                }
            }
        }
        lost
    }

    /// One reconciliation pass; stops between strategies once `cancel` fires
    pub async fn reconcile_cycle(&self, cancel: &CancellationToken) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for id in self.ownership.owned() {
            if cancel.is_cancelled() {
                return report;
            }
            match self.repository.definition(id).await {
                Ok(Some(definition)) if definition.is_runnable => {
                    let changed = self
                        .loaded
                        .lock()
                        .get(&id)
                        .map_or(true, |current| current.differs_from(&definition));
                    if changed && self.load(definition).await {
                        tracing::info!("Reloaded strategy {}", id);
                        report.reloaded += 1;
                    }
                }
                Ok(_) => {
                    tracing::info!("Strategy {} removed or no longer runnable, releasing", id);
                    self.unload(id).await;
                    self.release_best_effort(id).await;
                    report.released += 1;
                }
                Err(e) => tracing::warn!("Could not re-read strategy {}: {}", id, e),
            }
        }

        let runnable = match self.repository.runnable_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Could not list runnable strategies: {}", e);
                return report;
            }
        };

        for id in runnable {
            if cancel.is_cancelled() {
                break;
            }
            if self.ownership.owns(id) {
                continue;
            }
            match self.ownership.acquire(id).await {
                Ok(true) => match self.repository.definition(id).await {
                    Ok(Some(definition)) if definition.is_runnable => {
                        if self.load(definition).await {
                            tracing::info!("Acquired strategy {}", id);
                            report.acquired += 1;
                        }
                    }
                    Ok(_) => self.release_best_effort(id).await,
                    Err(e) => {
                        tracing::warn!("Could not read acquired strategy {}: {}", id, e);
                        self.release_best_effort(id).await;
                    }
                },
                Ok(false) => {
                    tracing::debug!("Strategy {} is owned elsewhere", id);
                    report.contended += 1;
                }
                Err(e) => tracing::warn!("Could not acquire strategy {}: {}", id, e),
            }
        }

        report
    }

    /// Release every owned lease and unload every loaded strategy
    pub async fn shutdown(&self) {
        let owned = self.ownership.owned();
        for id in &owned {
            self.release_best_effort(*id).await;
        }
        for id in self.loaded() {
            self.unload(id).await;
        }
        tracing::info!(
            "Lease loop for {} stopped, released {} leases",
            self.ownership.instance_id(),
            owned.len()
        );
    }

    async fn load(&self, definition: StrategyDefinition) -> bool {
        let id = definition.id;
        match self.engine.upsert(definition.clone()).await {
            Ok(()) => {
                self.loaded.lock().insert(id, definition);
                true
            }
            Err(e) => {
                tracing::error!("Failed to load strategy {}, releasing its lease: {}", id, e);
                self.unload(id).await;
                self.release_best_effort(id).await;
                false
            }
        }
    }

    async fn unload(&self, id: StrategyId) {
        self.loaded.lock().remove(&id);
        if let Err(e) = self.engine.remove(id).await {
            tracing::error!("Failed to unload strategy {}: {}", id, e);
        }
    }

    async fn release_best_effort(&self, id: StrategyId) {
        if let Err(e) = self.ownership.release(id).await {
            tracing::debug!("Release of strategy {} failed: {}", id, e);
        }
    }
}
