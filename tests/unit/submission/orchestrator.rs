//! Unit tests for the submission checker

use alphagate::baseline::{BaselineSynchronizer, SyncConfig};
use alphagate::cache::ReturnsCache;
use alphagate::core::poller::PollError;
use alphagate::correlation::{CorrelationEngine, CorrelationGate, SourceKind};
use alphagate::error::{CheckError, ServiceError, Stage};
use alphagate::metrics::Metrics;
use alphagate::models::{AlphaId, CheckResult, PoolKind, ReadinessCheck, ReadinessReport};
use alphagate::submission::{CheckerConfig, SubmissionChecker};
use std::sync::Arc;
use tempfile::TempDir;

use crate::support::{
    details, fast_poller, power_pool, recent_series, record, result, wave, FakeCorrelationService,
    FakeRegistry,
};

struct Fixture {
    _dir: TempDir,
    registry: Arc<FakeRegistry>,
    service: Arc<FakeCorrelationService>,
    synchronizer: Arc<BaselineSynchronizer>,
    checker: SubmissionChecker,
}

fn fixture_with(service: FakeCorrelationService, config: CheckerConfig, max_attempts: u32) -> Fixture {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::new());
    let service = Arc::new(service);
    let cache = Arc::new(ReturnsCache::open(dir.path()).unwrap());
    let synchronizer = Arc::new(BaselineSynchronizer::new(
        registry.clone(),
        cache,
        fast_poller(max_attempts),
        SyncConfig::default(),
    ));
    let checker = SubmissionChecker::new(
        registry.clone(),
        service.clone(),
        synchronizer.clone(),
        CorrelationEngine::default(),
        CorrelationGate::default(),
        fast_poller(max_attempts),
        config,
    );
    Fixture {
        _dir: dir,
        registry,
        service,
        synchronizer,
        checker,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeCorrelationService::new(), CheckerConfig::default(), 5)
}

fn id(s: &str) -> AlphaId {
    AlphaId::new(s)
}

/// USA power-pool baseline holding TOP (sharpe 1.0), plus an unsubmitted
/// candidate CAND correlated with it at roughly 0.89
async fn seed_power_pool(f: &Fixture, candidate_sharpe: f64) {
    f.registry
        .accept(details("TOP", "USA", true, 1.0), recent_series(&wave(60, 0.5)));
    f.registry.candidate(
        details("CAND", "USA", false, candidate_sharpe),
        recent_series(&wave(60, 0.0)),
    );
    f.synchronizer.sync(&power_pool("USA")).await.unwrap();
}

#[tokio::test]
async fn local_prod_fails_fast_without_io() {
    let f = fixture();

    let err = f
        .checker
        .check(&id("CAND"), PoolKind::Prod, SourceKind::Local)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::Precondition { pool_kind: PoolKind::Prod, .. }));
    assert_eq!(err.stage(), Stage::Evaluate);
    assert!(!err.is_retryable());
    assert_eq!(f.registry.detail_calls(), 0);
    assert_eq!(f.registry.series_polls(), 0);
}

#[tokio::test]
async fn local_check_without_baseline_fails_fast() {
    let f = fixture();
    seed_power_pool(&f, 1.2).await;
    let calls = f.registry.detail_calls();

    let err = f
        .checker
        .check(&id("CAND"), PoolKind::SelfPool, SourceKind::Local)
        .await
        .unwrap_err();

    match err {
        CheckError::Precondition { pool_kind, detail } => {
            assert_eq!(pool_kind, PoolKind::SelfPool);
            assert!(detail.contains("no local self baseline"), "{}", detail);
        }
        other => panic!("expected precondition, got {:?}", other),
    }
    assert_eq!(f.registry.detail_calls(), calls);
}

#[tokio::test]
async fn local_check_in_unsynced_region_is_a_precondition_error() {
    let f = fixture();
    seed_power_pool(&f, 1.2).await;
    f.registry
        .candidate(details("EU1", "EUR", false, 2.0), recent_series(&wave(60, 0.0)));

    let err = f
        .checker
        .check(&id("EU1"), PoolKind::PowerPool, SourceKind::Local)
        .await
        .unwrap_err();

    match err {
        CheckError::Precondition { detail, .. } => assert!(detail.contains("region EUR"), "{}", detail),
        other => panic!("expected precondition, got {:?}", other),
    }
}

#[tokio::test]
async fn local_power_pool_override_passes() {
    let f = fixture();
    seed_power_pool(&f, 1.2).await;

    let verdict = f
        .checker
        .check(&id("CAND"), PoolKind::PowerPool, SourceKind::Local)
        .await
        .unwrap();

    assert!(verdict.passed, "{}", verdict.reason);
    assert!(verdict.override_applied);
    assert_eq!(verdict.counterpart, Some(id("TOP")));
    assert_eq!(verdict.required_sharpe, Some(1.1));
    assert!(verdict.max_correlation.unwrap() > 0.5);
}

#[tokio::test]
async fn local_power_pool_override_fails_with_low_sharpe() {
    let f = fixture();
    seed_power_pool(&f, 1.05).await;

    let verdict = f
        .checker
        .check(&id("CAND"), PoolKind::PowerPool, SourceKind::Local)
        .await
        .unwrap();

    assert!(!verdict.passed);
    assert!(verdict.override_applied);
    assert!(verdict.reason.contains("1.05 < 1.1"), "{}", verdict.reason);
}

#[tokio::test]
async fn cached_candidate_reuses_its_series_and_skips_itself() {
    let f = fixture();
    seed_power_pool(&f, 1.2).await;
    let polls = f.registry.series_polls();

    let verdict = f
        .checker
        .check(&id("TOP"), PoolKind::PowerPool, SourceKind::Local)
        .await
        .unwrap();

    assert_eq!(f.registry.series_polls(), polls);
    assert!(verdict.passed);
    assert_eq!(verdict.max_correlation, None);
    assert_eq!(verdict.reason, "no correlated alphas in pool");
}

#[tokio::test]
async fn sync_before_local_builds_the_baseline_first() {
    let f = fixture_with(
        FakeCorrelationService::new(),
        CheckerConfig {
            sync_before_local: true,
        },
        5,
    );
    f.registry
        .accept(details("TOP", "USA", true, 1.0), recent_series(&wave(60, 0.5)));
    f.registry
        .candidate(details("CAND", "USA", false, 1.2), recent_series(&wave(60, 0.0)));

    let verdict = f
        .checker
        .check(&id("CAND"), PoolKind::PowerPool, SourceKind::Local)
        .await
        .unwrap();

    assert!(verdict.passed);
    assert!(f.synchronizer.cache().is_synced(&power_pool("USA")).await);
}

#[tokio::test]
async fn remote_empty_result_passes_vacuously() {
    let f = fixture();
    f.registry
        .candidate(details("CAND", "USA", false, 1.0), recent_series(&wave(60, 0.0)));

    for pool in PoolKind::ALL {
        let verdict = f.checker.check(&id("CAND"), pool, SourceKind::Remote).await.unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.reason, "no correlated alphas in pool");
    }
}

#[tokio::test]
async fn remote_power_pool_override_cites_sharpes() {
    let f = fixture();
    f.registry
        .candidate(details("CAND", "USA", false, 1.1), recent_series(&wave(60, 0.0)));
    f.service.respond(
        "CAND",
        result(PoolKind::PowerPool, vec![record("TOP", 0.5561, Some(1.2))]),
    );

    let verdict = f
        .checker
        .check(&id("CAND"), PoolKind::PowerPool, SourceKind::Remote)
        .await
        .unwrap();

    assert!(!verdict.passed);
    assert!(verdict.override_applied);
    assert_eq!(verdict.max_correlation, Some(0.5561));
    assert!(verdict.reason.contains("1.1 < 1.32"), "{}", verdict.reason);
    // Remote checks never need the candidate series
    assert_eq!(f.registry.series_polls(), 0);
}

#[tokio::test]
async fn remote_prod_result_carries_no_counterparts() {
    let f = fixture();
    f.registry
        .candidate(details("CAND", "USA", false, 3.0), recent_series(&wave(60, 0.0)));
    f.service.respond(
        "CAND",
        result(PoolKind::Prod, vec![record("SECRET", 0.8, Some(0.1))]),
    );

    let verdict = f
        .checker
        .check(&id("CAND"), PoolKind::Prod, SourceKind::Remote)
        .await
        .unwrap();

    assert!(!verdict.passed);
    assert!(!verdict.override_applied);
    assert_eq!(verdict.max_correlation, Some(0.8));
    assert!(verdict.top_correlations.is_empty());
    assert_eq!(verdict.count, 0);
}

#[tokio::test]
async fn remote_check_waits_through_pending_polls() {
    let f = fixture_with(FakeCorrelationService::new().with_pending(3), CheckerConfig::default(), 5);
    f.registry
        .candidate(details("CAND", "USA", false, 1.0), recent_series(&wave(60, 0.0)));

    let verdict = f
        .checker
        .check(&id("CAND"), PoolKind::SelfPool, SourceKind::Remote)
        .await
        .unwrap();

    assert!(verdict.passed);
    assert_eq!(f.service.polls(), 4);
}

#[tokio::test]
async fn remote_check_out_of_budget_is_retryable() {
    let f = fixture_with(FakeCorrelationService::new().with_pending(100), CheckerConfig::default(), 3);
    f.registry
        .candidate(details("CAND", "USA", false, 1.0), recent_series(&wave(60, 0.0)));

    let err = f
        .checker
        .check(&id("CAND"), PoolKind::SelfPool, SourceKind::Remote)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::BudgetExceeded { attempts: 3, .. }));
    assert!(err.is_retryable());
    assert_eq!(err.pool_kind(), PoolKind::SelfPool);
    assert_eq!(err.stage(), Stage::Poll);
}

#[tokio::test]
async fn unknown_candidate_is_a_definitive_error() {
    let f = fixture();

    let err = f
        .checker
        .check(&id("NOPE"), PoolKind::SelfPool, SourceKind::Remote)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckError::Service {
            source: ServiceError::Gone(_),
            ..
        }
    ));
    assert!(!err.is_retryable());
    // Resolving the candidate is not a poll
    assert_eq!(err.stage(), Stage::Evaluate);
}

#[tokio::test]
async fn check_all_reports_every_pool() {
    let f = fixture();
    f.registry
        .candidate(details("CAND", "USA", false, 1.0), recent_series(&wave(60, 0.0)));
    f.service.respond(
        "CAND",
        result(PoolKind::SelfPool, vec![record("MINE", 0.9, Some(1.0))]),
    );

    let pools = PoolKind::parse_selection("both").unwrap();
    let report = f
        .checker
        .check_all(&id("CAND"), &pools, SourceKind::Remote)
        .await
        .unwrap();

    assert_eq!(report.verdicts.len(), 2);
    assert_eq!(report.verdicts[0].pool_kind, PoolKind::Prod);
    assert!(report.verdicts[0].passed);
    assert!(!report.verdicts[1].passed);
    assert!(!report.all_passed);
}

#[tokio::test]
async fn check_all_local_with_prod_fails_before_io() {
    let f = fixture();
    seed_power_pool(&f, 1.2).await;
    let calls = f.registry.detail_calls();

    let err = f
        .checker
        .check_all(&id("CAND"), &PoolKind::ALL, SourceKind::Local)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::Precondition { pool_kind: PoolKind::Prod, .. }));
    assert_eq!(f.registry.detail_calls(), calls);
}

#[tokio::test]
async fn batch_reports_each_candidate_and_the_pairwise_matrix() {
    let f = fixture();
    seed_power_pool(&f, 1.5).await;
    let base = wave(60, 0.0);
    let scaled: Vec<f64> = base.iter().map(|v| v * 3.0).collect();
    f.registry
        .candidate(details("TWIN", "USA", false, 1.5), recent_series(&scaled));

    let report = f
        .checker
        .check_batch(&[id("CAND"), id("TWIN"), id("MISSING")], PoolKind::PowerPool)
        .await
        .unwrap();

    assert_eq!(report.inter.len(), 3);
    assert!(report.inter[0].verdict.as_ref().unwrap().passed);
    assert!(report.inter[1].verdict.as_ref().unwrap().passed);
    assert!(report.inter[2].verdict.is_none());
    assert!(report.inter[2].error.is_some());
    assert!(!report.all_passed());

    assert_eq!(report.intra.ids, vec![id("CAND"), id("TWIN")]);
    assert_eq!(report.intra.between(&id("CAND"), &id("TWIN")), Some(1.0));
    assert_eq!(report.intra.conflicts(0.5).len(), 1);
}

#[tokio::test]
async fn batch_checks_repeated_ids_once() {
    let f = fixture();
    seed_power_pool(&f, 1.5).await;
    let polls = f.registry.series_polls();

    let report = f
        .checker
        .check_batch(&[id("CAND"), id("CAND"), id("TOP")], PoolKind::PowerPool)
        .await
        .unwrap();

    assert_eq!(report.inter.len(), 2);
    assert_eq!(report.inter[0].alpha_id, id("CAND"));
    assert_eq!(report.inter[1].alpha_id, id("TOP"));
    assert_eq!(report.intra.ids, vec![id("CAND"), id("TOP")]);
    assert_eq!(report.intra.get(0, 0), None);
    assert_eq!(report.intra.get(1, 1), None);
    // CAND downloaded once, TOP served from the cache
    assert_eq!(f.registry.series_polls(), polls + 1);
}

#[tokio::test]
async fn batch_sync_completes_before_series_are_read() {
    let f = fixture_with(
        FakeCorrelationService::new(),
        CheckerConfig {
            sync_before_local: true,
        },
        5,
    );
    seed_power_pool(&f, 1.0).await;
    let fresh = recent_series(&wave(60, 2.0));
    f.registry.replace_series("TOP", fresh.clone());
    f.registry.set_sharpe("TOP", 1.3);
    f.registry
        .candidate(details("NEW", "USA", false, 1.0), fresh.clone());

    let report = f
        .checker
        .check_batch(&[id("TOP"), id("NEW")], PoolKind::PowerPool)
        .await
        .unwrap();

    let cached = f.synchronizer.cache().get(&id("TOP")).await.unwrap();
    assert_eq!(cached.series, fresh);
    // Both members carry the refreshed series
    assert_eq!(report.intra.between(&id("TOP"), &id("NEW")), Some(1.0));
}

#[tokio::test]
async fn batch_rejects_prod() {
    let f = fixture();

    let err = f
        .checker
        .check_batch(&[id("A"), id("B")], PoolKind::Prod)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckError::Precondition { .. }));
    assert_eq!(f.registry.detail_calls(), 0);
}

#[tokio::test]
async fn readiness_returns_the_platform_report() {
    let f = fixture();
    f.service.respond_readiness(ReadinessReport {
        alpha_id: id("CAND"),
        checks: vec![
            ReadinessCheck {
                name: "LOW_SHARPE".to_string(),
                result: CheckResult::Pass,
                value: Some(1.6),
                limit: Some(1.25),
            },
            ReadinessCheck {
                name: "CONCENTRATED_WEIGHT".to_string(),
                result: CheckResult::Warning,
                value: None,
                limit: None,
            },
        ],
        rejected: false,
    });

    let report = f.checker.readiness(&id("CAND")).await.unwrap();
    assert!(report.passed());
    assert_eq!(report.checks.len(), 2);

    let missing = f.checker.readiness(&id("NOPE")).await.unwrap_err();
    assert!(matches!(missing, PollError::Service(ServiceError::Gone(_))));
}

#[tokio::test]
async fn outcomes_are_counted_per_pool() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(FakeRegistry::new());
    let cache = Arc::new(ReturnsCache::open(dir.path()).unwrap());
    let synchronizer = Arc::new(BaselineSynchronizer::new(
        registry.clone(),
        cache,
        fast_poller(5),
        SyncConfig::default(),
    ));
    let service = Arc::new(FakeCorrelationService::new());
    service.respond(
        "CAND",
        result(PoolKind::SelfPool, vec![record("MINE", 0.9, Some(1.0))]),
    );
    let checker = SubmissionChecker::new(
        registry.clone(),
        service,
        synchronizer,
        CorrelationEngine::default(),
        CorrelationGate::default(),
        fast_poller(5),
        CheckerConfig::default(),
    )
    .with_metrics(metrics.clone());
    registry.candidate(details("CAND", "USA", false, 1.0), recent_series(&wave(60, 0.0)));

    checker.check(&id("CAND"), PoolKind::Prod, SourceKind::Remote).await.unwrap();
    checker.check(&id("CAND"), PoolKind::SelfPool, SourceKind::Remote).await.unwrap();

    let count = |pool: &str, outcome: &str| metrics.checks_total.with_label_values(&[pool, outcome]).get();
    assert_eq!(count("prod", "pass"), 1);
    assert_eq!(count("self", "fail"), 1);
    assert_eq!(count("self", "pass"), 0);
}
