use chrono::NaiveDate;
use mdp_cdn::{
    CacheInvalidationEngine, CacheMetrics, CdnConfig, OriginOverrides, ProbeResponse, PurgeMode,
    PurgeOutcome, PurgeStatus, PurgeStatusReport, StatsRange,
};
use mdp_model::ErrorKind;
use mdp_test_utils::ScriptedCdn;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn engine(cdn: &Arc<ScriptedCdn>) -> CacheInvalidationEngine {
    CacheInvalidationEngine::new(cdn.clone(), CdnConfig::default())
}

#[tokio::test]
async fn empty_smart_purge_makes_no_provider_call() {
    let cdn = Arc::new(ScriptedCdn::new());
    let engine = engine(&cdn);

    let result = engine.smart_purge(&[]).await;

    assert!(result.success);
    assert_eq!(cdn.purge_count(), 0);
    assert_eq!(engine.purge_statistics().total_purges, 0);
}

#[tokio::test(start_paused = true)]
async fn wait_reports_completion_after_polling() {
    let cdn = Arc::new(ScriptedCdn::new().with_statuses([
        PurgeStatus::InProgress,
        PurgeStatus::InProgress,
        PurgeStatus::Completed,
    ]));
    let engine = engine(&cdn);
    let job = engine
        .request_purge(&["/a.webp".to_string()], PurgeMode::Paths)
        .await
        .unwrap();

    let outcome = engine
        .wait_for_completion(&job.id, Duration::from_secs(60), Duration::from_secs(5))
        .await;

    assert_eq!(
        outcome,
        PurgeOutcome::Completed {
            job_id: job.id.clone(),
            elapsed_ms: 10_000,
        }
    );
    assert_eq!(cdn.poll_count(), 3);
    assert_eq!(engine.job(&job.id).unwrap().status, PurgeStatus::Completed);
    assert_eq!(engine.tracked_jobs(), 0);
}

#[tokio::test(start_paused = true)]
async fn finished_jobs_leave_the_tracked_set() {
    let cdn = Arc::new(ScriptedCdn::new());
    let engine = engine(&cdn);

    for i in 0..100 {
        let job = engine
            .request_purge(&[format!("/file-{i}")], PurgeMode::Paths)
            .await
            .unwrap();
        let outcome = engine
            .wait_for_completion(&job.id, Duration::from_secs(60), Duration::from_secs(5))
            .await;
        assert!(matches!(outcome, PurgeOutcome::Completed { .. }));
    }

    assert_eq!(engine.tracked_jobs(), 0);
    let archived = engine.archived_jobs();
    assert_eq!(archived.len(), 100);
    assert!(archived.iter().all(|j| j.status == PurgeStatus::Completed));
    assert_eq!(archived[0].paths, vec!["/file-0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn failed_and_timed_out_jobs() {
    let cdn = Arc::new(
        ScriptedCdn::new().with_reports([PurgeStatusReport::failed("origin unreachable")]),
    );
    let engine = engine(&cdn);
    let job = engine
        .request_purge(&["/a.webp".to_string()], PurgeMode::Paths)
        .await
        .unwrap();
    engine
        .wait_for_completion(&job.id, Duration::from_secs(60), Duration::from_secs(5))
        .await;
    assert_eq!(engine.tracked_jobs(), 0);
    assert_eq!(engine.archived_jobs()[0].status, PurgeStatus::Failed);

    let slow = Arc::new(ScriptedCdn::new().with_statuses([PurgeStatus::InProgress]));
    let engine = CacheInvalidationEngine::new(slow, CdnConfig::default());
    let job = engine
        .request_purge(&["/b.webp".to_string()], PurgeMode::Paths)
        .await
        .unwrap();
    engine
        .wait_for_completion(&job.id, Duration::from_secs(6), Duration::from_secs(5))
        .await;
    assert_eq!(engine.tracked_jobs(), 1);
    assert!(engine.archived_jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_reports_provider_failure_reason() {
    let cdn = Arc::new(
        ScriptedCdn::new().with_reports([PurgeStatusReport::failed("origin unreachable")]),
    );
    let engine = engine(&cdn);
    let job = engine
        .request_purge(&["/a.webp".to_string()], PurgeMode::Paths)
        .await
        .unwrap();

    let outcome = engine
        .wait_for_completion(&job.id, Duration::from_secs(60), Duration::from_secs(5))
        .await;

    match outcome {
        PurgeOutcome::Failed { reason, .. } => assert_eq!(reason, "origin unreachable"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_without_cancelling() {
    let cdn = Arc::new(ScriptedCdn::new().with_statuses([PurgeStatus::InProgress]));
    let engine = engine(&cdn);
    let job = engine
        .request_purge(&["/a.webp".to_string()], PurgeMode::Paths)
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let outcome = engine
        .wait_for_completion(&job.id, Duration::from_secs(12), Duration::from_secs(5))
        .await;

    assert_eq!(
        outcome,
        PurgeOutcome::TimedOut {
            job_id: job.id.clone(),
            last_status: PurgeStatus::InProgress,
        }
    );
    assert_eq!(started.elapsed(), Duration::from_secs(12));
    assert_eq!(cdn.poll_count(), 3);
    assert_eq!(
        outcome.to_failure().map(|f| f.kind),
        Some(ErrorKind::Timeout)
    );
}

#[tokio::test]
async fn smart_purge_history_accumulates() {
    let cdn = Arc::new(ScriptedCdn::new());
    let engine = engine(&cdn);

    engine
        .smart_purge(&["/a.webp".to_string(), "/b.webp".to_string()])
        .await;
    let second = engine.smart_purge(&["/c.css".to_string()]).await;

    let stats = engine.purge_statistics();
    assert_eq!(stats.total_purges, 2);
    assert_eq!(stats.total_files_purged, 3);
    assert_eq!(
        engine.history().last().map(|r| &r.job_id),
        second.job_id()
    );
    assert_eq!(cdn.purge_count(), 2);
}

#[tokio::test]
async fn job_ids_are_unique_per_request() {
    let cdn = Arc::new(ScriptedCdn::new());
    let engine = engine(&cdn);

    let mut ids = HashSet::new();
    for i in 0..50 {
        let job = engine
            .request_purge(&[format!("/file-{i}")], PurgeMode::Paths)
            .await
            .unwrap();
        ids.insert(job.id);
    }
    assert_eq!(ids.len(), 50);
    assert_eq!(engine.tracked_jobs(), 50);
}

#[tokio::test]
async fn pattern_purge_reaches_provider() {
    let cdn = Arc::new(ScriptedCdn::new());
    let engine = engine(&cdn);

    let job = engine.purge_pattern("/images/*.jpg").await.unwrap();

    assert_eq!(job.mode, PurgeMode::Pattern("/images/*.jpg".to_string()));
    let requests = cdn.purge_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].mode, job.mode);
    assert!(engine.purge_pattern("  ").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn slow_probe_is_bounded_by_timeout() {
    let cdn = Arc::new(ScriptedCdn::new().with_probe_delay(Duration::from_secs(30)));
    let engine = engine(&cdn);

    let result = engine.test_response("https://cdn.test/a.webp").await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    assert!((result.response_time_ms - 10_000.0).abs() < 1.0);
}

#[tokio::test]
async fn probe_reports_status_and_cache_state() {
    let mut response = ProbeResponse::with_status(404).with_x_cache("MISS");
    response.content_type = Some("text/html".to_string());
    let cdn = Arc::new(ScriptedCdn::new().with_probe(response));
    let engine = engine(&cdn);

    let result = engine.test_response("https://cdn.test/missing").await;

    assert!(result.success);
    assert!(!result.is_ok_200());
    assert_eq!(result.status_code, Some(404));
    assert_eq!(result.content_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn origin_overrides_keep_defaults() {
    let cdn = Arc::new(ScriptedCdn::new());
    let engine = engine(&cdn);

    let config = engine
        .configure_origin(
            "https://storage.test/assets",
            Some(OriginOverrides::new().with_compression(false)),
        )
        .await
        .unwrap();

    assert!(!config.settings.enable_compression);
    assert_eq!(config.settings.cache_ttl_secs, 86_400);
    assert!(config.settings.enable_cors);
    assert_eq!(cdn.origins(), vec![config]);
}

#[tokio::test]
async fn cache_statistics_over_explicit_range() {
    let cdn = Arc::new(ScriptedCdn::new().with_cache_metrics(CacheMetrics {
        total_requests: 1_250_000,
        cache_hits: 1_093_750,
        cache_misses: 156_250,
        bandwidth_bytes: 1_342_712_217_600,
        avg_response_time_ms: 45.0,
    }));
    let engine = engine(&cdn);
    let range = StatsRange::new(
        NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 10, 28).unwrap(),
    );

    let stats = engine.cache_statistics(Some(range)).await.unwrap();

    assert_eq!(stats.range, range);
    assert!((stats.cache_hit_rate - 87.5).abs() < f64::EPSILON);
    assert_eq!(cdn.stats_ranges(), vec![range]);
}

#[tokio::test]
async fn cache_statistics_unsupported_by_provider() {
    let cdn = Arc::new(ScriptedCdn::new());
    let engine = engine(&cdn);

    let err = engine.cache_statistics(None).await.unwrap_err();

    assert_eq!(err.code(), Some("NotSupported"));
    assert_eq!(err.kind(), ErrorKind::RemoteRejection);
}
