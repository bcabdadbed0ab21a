//! Lease handover between instances sharing one store

use std::sync::Arc;
use std::time::Duration;
use strategy_ownership::test_utils::{definition, MemoryRepository, RecordingEngine};
use strategy_ownership::{
    InMemoryLeaseStore, LeaseLoop, LeaseLoopSettings, OwnershipService,
};
use tokio_util::sync::CancellationToken;
use types::StrategyId;

const TTL: Duration = Duration::from_secs(10);

fn service(store: &Arc<InMemoryLeaseStore>, instance: &str) -> Arc<OwnershipService> {
    Arc::new(OwnershipService::new(
        instance,
        "strategy_lease",
        TTL,
        store.clone(),
    ))
}

#[tokio::test(start_paused = true)]
async fn lapsed_lease_is_taken_over() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let a = service(&store, "instance-a");
    let b = service(&store, "instance-b");
    let id = StrategyId(7);

    assert!(a.acquire(id).await.unwrap());
    assert!(!b.acquire(id).await.unwrap());

    // A keeps renewing for a while, B keeps failing
    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(a.renew(id).await.unwrap());
        assert!(!b.acquire(id).await.unwrap());
    }

    // A stops renewing; just short of the TTL the lease still holds
    tokio::time::advance(Duration::from_secs(9)).await;
    assert!(!b.acquire(id).await.unwrap());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(b.acquire(id).await.unwrap());
    assert_eq!(
        store.owner_of("strategy_lease:7").as_deref(),
        Some("instance-b")
    );

    // A notices on its next renewal and never deletes B's lease
    assert!(!a.renew(id).await.unwrap());
    assert!(!a.owns(id));
    assert!(!a.release(id).await.unwrap());
    assert!(b.owns(id));
    assert!(b.renew(id).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_have_one_winner() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let contenders = 16;
    let start = Arc::new(tokio::sync::Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let service = service(&store, &format!("instance-{i}"));
            let start = Arc::clone(&start);
            tokio::spawn(async move {
                start.wait().await;
                let won = service.acquire(StrategyId(7)).await.unwrap();
                (service.instance_id().to_string(), won)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let (instance, won) = handle.await.unwrap();
        if won {
            winners.push(instance);
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(
        store.owner_of("strategy_lease:7").as_deref(),
        Some(winners[0].as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn lease_loops_hand_over_a_strategy() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let repo = Arc::new(MemoryRepository::new());
    repo.put(definition(7, "buy the dip", true));

    let engine_a = Arc::new(RecordingEngine::new());
    let engine_b = Arc::new(RecordingEngine::new());
    let loop_a = LeaseLoop::new(
        service(&store, "a"),
        repo.clone(),
        engine_a.clone(),
        LeaseLoopSettings::default(),
    );
    let loop_b = LeaseLoop::new(
        service(&store, "b"),
        repo.clone(),
        engine_b.clone(),
        LeaseLoopSettings::default(),
    );

    let cancel = CancellationToken::new();
    assert_eq!(loop_a.reconcile_cycle(&cancel).await.acquired, 1);
    assert_eq!(loop_b.reconcile_cycle(&cancel).await.contended, 1);
    assert_eq!(engine_a.active(), vec![StrategyId(7)]);
    assert!(engine_b.active().is_empty());

    // A goes silent past the TTL, B takes over
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    assert_eq!(loop_b.reconcile_cycle(&cancel).await.acquired, 1);
    assert_eq!(engine_b.active(), vec![StrategyId(7)]);

    // A's renewal fails, so it unloads
    assert_eq!(loop_a.renew_cycle(&cancel).await, 1);
    assert!(engine_a.active().is_empty());
    assert!(loop_a.loaded().is_empty());
    assert_eq!(store.owner_of("strategy_lease:7").as_deref(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn run_releases_everything_on_cancel() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let repo = Arc::new(MemoryRepository::new());
    repo.put(definition(1, "one", true));
    repo.put(definition(2, "two", true));
    let engine = Arc::new(RecordingEngine::new());

    let lease_loop = Arc::new(LeaseLoop::new(
        service(&store, "a"),
        repo.clone(),
        engine.clone(),
        LeaseLoopSettings {
            renew_interval: Duration::from_secs(3),
            reconcile_interval: Duration::from_secs(30),
        },
    ));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&lease_loop).run(cancel.clone()));

    // well past the TTL: renewals keep the leases alive
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(engine.active(), vec![StrategyId(1), StrategyId(2)]);
    assert_eq!(store.owner_of("strategy_lease:1").as_deref(), Some("a"));

    // a definition added later is picked up by the next reconciliation
    repo.put(definition(3, "three", true));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.active().len(), 3);

    cancel.cancel();
    handle.await.unwrap();
    assert!(engine.active().is_empty());
    assert!(store.owner_of("strategy_lease:1").is_none());
    assert!(store.owner_of("strategy_lease:3").is_none());
}
