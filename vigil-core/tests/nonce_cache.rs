mod fixtures;

use fixtures::{cache_config, dyn_cosigners, local_cosigners, MockPruner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use vigil_core::application::{CosignerNonceCache, FixedLeader, NonceCacheConfig};
use vigil_core::foundation::{CosignerId, SignerError};

fn leader() -> Arc<FixedLeader> {
    Arc::new(FixedLeader::new(CosignerId::new(1), CosignerId::new(1)))
}

fn follower() -> Arc<FixedLeader> {
    Arc::new(FixedLeader::new(CosignerId::new(1), CosignerId::new(2)))
}

fn ids(raw: &[u8]) -> Vec<CosignerId> {
    raw.iter().copied().map(CosignerId::new).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn load_n_fills_cache_with_threshold_complete_sets() {
    let locals = local_cosigners(2, 3);
    let cache = CosignerNonceCache::new(cache_config(2), dyn_cosigners(&locals), leader(), None);

    let added = cache.load_n(25).await;
    assert_eq!(added, 25);
    assert_eq!(cache.size(), 25);

    let entry = cache.get_nonces(&ids(&[1, 2, 3])).expect("entry");
    assert_eq!(entry.sources().collect::<Vec<_>>(), ids(&[1, 2, 3]));
    assert_eq!(cache.size(), 24);
}

#[tokio::test(flavor = "multi_thread")]
async fn consumed_entries_never_overlap_under_concurrency() {
    let locals = local_cosigners(2, 3);
    let cache = CosignerNonceCache::new(cache_config(2), dyn_cosigners(&locals), leader(), None);
    cache.load_n(64).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let mut uuids = Vec::new();
            for _ in 0..8 {
                let entry = cache.get_nonces(&[CosignerId::new(1), CosignerId::new(2)]).expect("entry");
                uuids.push(entry.uuid);
            }
            uuids
        }));
    }

    let mut seen = std::collections::HashSet::new();
    for handle in handles {
        for uuid in handle.await.expect("join") {
            assert!(seen.insert(uuid), "nonce set {uuid} consumed twice");
        }
    }
    assert_eq!(seen.len(), 64);
    assert_eq!(cache.size(), 0);
    assert!(matches!(cache.get_nonces(&ids(&[1, 2])), Err(SignerError::NoNoncesAvailable)));
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_nonces_removes_cosigner_and_drops_below_threshold() {
    let locals = local_cosigners(2, 3);
    let cache = CosignerNonceCache::new(cache_config(2), dyn_cosigners(&locals), leader(), None);
    cache.load_n(10).await;
    assert_eq!(cache.size(), 10);

    cache.clear_nonces(CosignerId::new(3));
    assert_eq!(cache.size(), 10);
    let entry = cache.get_nonces(&ids(&[1, 2])).expect("entry");
    assert_eq!(entry.sources().collect::<Vec<_>>(), ids(&[1, 2]));

    cache.clear_nonces(CosignerId::new(2));
    assert_eq!(cache.size(), 0);
}

/// Sustained consumption: the reconcile loop keeps the pool ahead of demand,
/// nothing expires, and the final size respects the demand target.
#[tokio::test(flavor = "multi_thread")]
async fn reconcile_tracks_demand_under_sustained_consumption() {
    let locals = local_cosigners(2, 3);
    let pruner = MockPruner::new();
    let config = NonceCacheConfig {
        get_nonces_interval: Duration::from_millis(100),
        get_nonces_timeout: Duration::from_millis(500),
        nonce_expiration: Duration::from_secs(10),
        threshold: 2,
        safety_factor: 1.2,
        target_min: 10,
        target_max: 2_000,
    };
    let cache = CosignerNonceCache::new(config, dyn_cosigners(&locals), leader(), Some(pruner.clone()));
    pruner.attach(Arc::clone(&cache));

    cache.load_n(100).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(Arc::clone(&cache).run(shutdown_rx));

    for _ in 0..200 {
        let entry = cache.get_nonces(&ids(&[1, 2]));
        assert!(entry.is_ok(), "cache ran dry under demand");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.size() > 0, "cache ran dry under demand");
    }

    shutdown_tx.send(true).expect("shutdown");
    loop_handle.await.expect("join");

    let size = cache.size();
    assert!(size > 0);
    // Nominal demand is 100 sets/s; the pool must not overshoot the target
    // for that demand (20% headroom on the measured rate).
    assert!(size <= cache.target(120.0), "pool {size} overshoots demand target {}", cache.target(120.0));

    let (count, pruned) = pruner.result();
    assert!(count > 0);
    assert_eq!(pruned, 0);
}

/// No consumption and a short TTL: everything loaded is pruned and the pool
/// settles at the floor of one ready set.
#[tokio::test(flavor = "multi_thread")]
async fn reconcile_prunes_expired_sets_down_to_the_floor() {
    let locals = local_cosigners(2, 3);
    let pruner = MockPruner::new();
    let config = NonceCacheConfig {
        get_nonces_interval: Duration::from_millis(100),
        get_nonces_timeout: Duration::from_millis(500),
        nonce_expiration: Duration::from_millis(300),
        threshold: 2,
        safety_factor: 1.2,
        target_min: 1,
        target_max: 2_000,
    };
    let cache = CosignerNonceCache::new(config, dyn_cosigners(&locals), leader(), Some(pruner.clone()));
    pruner.attach(Arc::clone(&cache));

    const LOADED: usize = 200;
    cache.load_n(LOADED).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(Arc::clone(&cache).run(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown_tx.send(true).expect("shutdown");
    loop_handle.await.expect("join");

    let (count, pruned) = pruner.result();
    assert!(count >= 3, "expected at least 3 reconcile passes, got {count}");
    assert!(pruned >= LOADED, "expected at least {LOADED} pruned, got {pruned}");
    assert!(cache.size() <= 1, "expected an idle pool, got {}", cache.size());
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_misses_feed_back_into_replenishment() {
    let locals = local_cosigners(2, 3);
    let cache = CosignerNonceCache::new(cache_config(2), dyn_cosigners(&locals), leader(), None);

    assert!(matches!(cache.get_nonces(&ids(&[1, 2])), Err(SignerError::NoNoncesAvailable)));
    cache.reconcile().await;

    // target floor of one plus one recorded miss
    assert_eq!(cache.size(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_leader_prunes_but_never_replenishes() {
    let locals = local_cosigners(2, 3);
    let pruner = MockPruner::new();
    let cache = CosignerNonceCache::new(cache_config(2), dyn_cosigners(&locals), follower(), Some(pruner.clone()));
    pruner.attach(Arc::clone(&cache));

    for _ in 0..3 {
        cache.reconcile().await;
    }
    assert_eq!(cache.size(), 0);

    let (count, _) = pruner.result();
    assert_eq!(count, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn replenishment_is_abandoned_below_threshold_responders() {
    let locals = local_cosigners(3, 3);
    // Only one cosigner reachable, threshold 3.
    let members = dyn_cosigners(&locals[..1]);
    let cache = CosignerNonceCache::new(cache_config(3), members, leader(), None);

    assert_eq!(cache.load_n(10).await, 0);
    assert_eq!(cache.size(), 0);
}
