//! Unit tests for baseline synchronization

use alphagate::baseline::{BaselineSynchronizer, SyncConfig};
use alphagate::cache::ReturnsCache;
use alphagate::error::CheckError;
use alphagate::models::{AlphaId, PoolKind, SyncScope};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use crate::support::{details, fast_poller, power_pool, recent_series, self_pool, wave, FakeRegistry};

struct Fixture {
    _dir: TempDir,
    registry: Arc<FakeRegistry>,
    cache: Arc<ReturnsCache>,
    synchronizer: BaselineSynchronizer,
}

fn fixture_with(config: SyncConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::new());
    let cache = Arc::new(ReturnsCache::open(dir.path()).unwrap());
    let synchronizer =
        BaselineSynchronizer::new(registry.clone(), cache.clone(), fast_poller(5), config);
    Fixture {
        _dir: dir,
        registry,
        cache,
        synchronizer,
    }
}

fn fixture() -> Fixture {
    fixture_with(SyncConfig::default())
}

fn ids(entries: &[AlphaId]) -> Vec<&str> {
    entries.iter().map(AlphaId::as_str).collect()
}

/// Power-pool USA alphas P1..Pn, plus noise in other scopes
fn seed(registry: &FakeRegistry, power_pool_alphas: usize) {
    for i in 1..=power_pool_alphas {
        registry.accept(
            details(&format!("P{}", i), "USA", true, 1.0 + i as f64 / 10.0),
            recent_series(&wave(60, i as f64)),
        );
    }
    registry.accept(details("S1", "USA", false, 1.5), recent_series(&wave(60, 9.0)));
    registry.accept(details("E1", "EUR", true, 1.5), recent_series(&wave(60, 7.0)));
}

#[tokio::test]
async fn sync_caches_only_the_requested_scope() {
    let f = fixture();
    seed(&f.registry, 3);

    let report = assert_ok!(f.synchronizer.sync(&power_pool("USA")).await);

    assert_eq!(report.listed, 3);
    assert_eq!(ids(&report.fetched), vec!["P1", "P2", "P3"]);
    assert!(report.is_complete());
    assert_eq!(f.cache.len().await, 3);
    assert!(f.cache.get(&AlphaId::new("S1")).await.is_none());
    assert!(f.cache.get(&AlphaId::new("E1")).await.is_none());
    assert!(f.cache.is_synced(&power_pool("USA")).await);
    assert!(!f.cache.is_synced(&self_pool("USA")).await);
}

#[tokio::test]
async fn self_scope_excludes_power_pool_alphas() {
    let f = fixture();
    seed(&f.registry, 2);

    let report = f.synchronizer.sync(&self_pool("USA")).await.unwrap();

    assert_eq!(ids(&report.fetched), vec!["S1"]);
    let snapshot = f.cache.snapshot(&self_pool("USA")).await;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].is_self);
}

#[tokio::test]
async fn second_sync_is_idempotent() {
    let f = fixture();
    seed(&f.registry, 3);
    let scope = power_pool("USA");

    f.synchronizer.sync(&scope).await.unwrap();
    let polls = f.registry.series_polls();
    let before = f.cache.snapshot(&scope).await;
    let synced_at = f.cache.synced_at(&scope).await;

    let report = f.synchronizer.sync(&scope).await.unwrap();

    assert!(report.fetched.is_empty());
    assert!(report.removed.is_empty());
    assert_eq!(report.reused, 3);
    assert_eq!(f.registry.series_polls(), polls);
    assert_eq!(f.cache.synced_at(&scope).await, synced_at);

    let after = f.cache.snapshot(&scope).await;
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(**a, **b);
    }
}

#[tokio::test]
async fn withdrawn_alphas_are_removed() {
    let f = fixture();
    seed(&f.registry, 3);
    let scope = power_pool("USA");
    f.synchronizer.sync(&scope).await.unwrap();

    f.registry.withdraw("P2");
    let report = f.synchronizer.sync(&scope).await.unwrap();

    assert_eq!(ids(&report.removed), vec!["P2"]);
    assert!(f.cache.get(&AlphaId::new("P2")).await.is_none());
    assert_eq!(f.cache.snapshot(&scope).await.len(), 2);
}

#[tokio::test]
async fn changed_stats_trigger_a_refetch() {
    let f = fixture();
    seed(&f.registry, 2);
    let scope = power_pool("USA");
    f.synchronizer.sync(&scope).await.unwrap();
    let polls = f.registry.series_polls();

    f.registry.set_sharpe("P1", 2.5);
    let report = f.synchronizer.sync(&scope).await.unwrap();

    assert_eq!(ids(&report.fetched), vec!["P1"]);
    assert_eq!(report.reused, 1);
    assert_eq!(f.registry.series_polls(), polls + 1);
    assert_eq!(
        f.cache.get(&AlphaId::new("P1")).await.unwrap().stats.sharpe,
        Some(2.5)
    );
}

#[tokio::test]
async fn failing_alpha_does_not_abort_the_sync() {
    let f = fixture();
    seed(&f.registry, 3);
    f.registry.fail_series("P2");

    let report = f.synchronizer.sync(&power_pool("USA")).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].alpha_id, AlphaId::new("P2"));
    assert!(report.failed[0].reason.contains("400"), "{}", report.failed[0].reason);
    assert_eq!(ids(&report.fetched), vec!["P1", "P3"]);
    assert!(f.cache.get(&AlphaId::new("P2")).await.is_none());
}

#[tokio::test]
async fn failed_alpha_is_retried_on_the_next_sync() {
    let f = fixture();
    seed(&f.registry, 2);
    let scope = power_pool("USA");
    f.registry.fail_series("P1");
    f.synchronizer.sync(&scope).await.unwrap();
    let polls = f.registry.series_polls();

    let report = f.synchronizer.sync(&scope).await.unwrap();

    // P2 is reused, P1 is attempted again
    assert_eq!(report.reused, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(f.registry.series_polls(), polls + 1);
}

#[tokio::test]
async fn empty_roster_clears_the_scope() {
    let f = fixture();
    seed(&f.registry, 2);
    let scope = power_pool("USA");
    f.synchronizer.sync(&scope).await.unwrap();

    let other = BaselineSynchronizer::new(
        Arc::new(FakeRegistry::new()),
        f.cache.clone(),
        fast_poller(5),
        SyncConfig::default(),
    );
    let report = other.sync(&scope).await.unwrap();

    assert_eq!(ids(&report.removed), vec!["P1", "P2"]);
    assert!(f.cache.snapshot(&scope).await.is_empty());
    assert!(f.cache.is_synced(&scope).await);
}

#[tokio::test]
async fn roster_is_paginated() {
    let f = fixture_with(SyncConfig {
        page_size: 2,
        ..SyncConfig::default()
    });
    seed(&f.registry, 5);

    let report = f.synchronizer.sync(&power_pool("USA")).await.unwrap();

    // 7 roster rows in pages of two
    assert_eq!(f.registry.roster_calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.listed, 5);
    assert_eq!(report.fetched.len(), 5);
}

#[tokio::test]
async fn prod_scope_is_a_precondition_error() {
    let f = fixture();
    seed(&f.registry, 1);

    let err = assert_err!(
        f.synchronizer
            .sync(&SyncScope::new("USA", PoolKind::Prod))
            .await
    );

    assert!(matches!(err, CheckError::Precondition { pool_kind: PoolKind::Prod, .. }));
    assert_eq!(f.registry.roster_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_alpha_times_out_and_is_reported() {
    let f = fixture_with(SyncConfig {
        alpha_timeout: Duration::from_secs(5),
        ..SyncConfig::default()
    });
    seed(&f.registry, 2);
    f.registry.stall_series("P1");

    let report = f.synchronizer.sync(&power_pool("USA")).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].alpha_id, AlphaId::new("P1"));
    assert!(report.failed[0].reason.contains("timed out"));
    assert_eq!(ids(&report.fetched), vec!["P2"]);
}

#[tokio::test]
async fn concurrent_syncs_of_one_scope_fetch_once() {
    let f = fixture();
    seed(&f.registry, 4);
    let scope = power_pool("USA");

    let (a, b) = tokio::join!(f.synchronizer.sync(&scope), f.synchronizer.sync(&scope));
    let (a, b) = (assert_ok!(a), assert_ok!(b));

    assert_eq!(a.fetched.len() + b.fetched.len(), 4);
    assert_eq!(a.reused + b.reused, 4);
    assert_eq!(f.registry.series_polls(), 4);
}

#[tokio::test]
async fn sync_all_covers_every_scope() {
    let f = fixture();
    seed(&f.registry, 2);

    let reports = f
        .synchronizer
        .sync_all(&[power_pool("USA"), self_pool("USA"), power_pool("EUR")])
        .await
        .unwrap();

    assert_eq!(reports.len(), 3);
    assert_eq!(f.cache.len().await, 4);
    assert_eq!(
        f.cache.synced_scopes().await,
        vec!["EUR/power-pool", "USA/power-pool", "USA/self"]
    );
}
