use mdp_cdn::{CacheState, CdnError, ProbeResponse, PurgeStatusReport};
use mdp_model::{ErrorKind, ObjectKey};
use mdp_optimizer::VariantSpec;
use mdp_pipeline::{MediaPipeline, PipelineConfig, RunState, Step};
use mdp_test_utils::{payload, write_tree, FakeCodec, FlakyStore, ScriptedCdn, CORRUPT_MARKER};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    pipeline: MediaPipeline,
    store: Arc<FlakyStore>,
    cdn: Arc<ScriptedCdn>,
    codec: Arc<FakeCodec>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with(PipelineConfig::default(), FlakyStore::new(["media"]), ScriptedCdn::new())
    }

    fn with(config: PipelineConfig, store: FlakyStore, cdn: ScriptedCdn) -> Self {
        let store = Arc::new(store);
        let cdn = Arc::new(cdn);
        let codec = Arc::new(FakeCodec::new());
        let pipeline = MediaPipeline::new(config, store.clone(), cdn.clone(), codec.clone());
        Self {
            pipeline,
            store,
            cdn,
            codec,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        write_tree(self.dir.path(), &[(name, bytes)]);
        self.dir.path().join(name)
    }
}

#[tokio::test]
async fn process_asset_runs_every_step_in_order() {
    let h = Harness::new();
    let path = h.file("photo.jpg", &payload(1000));

    let run = h.pipeline.process_asset(&path, true, None).await;

    assert!(run.success(), "{:?}", run.error());
    assert_eq!(run.state(), RunState::Succeeded);
    assert_eq!(run.steps_completed(), &Step::ORDER);
    assert_eq!(
        run.storage_url.as_deref(),
        Some("https://storage.test/media/originals/photo.jpg")
    );
    assert_eq!(
        run.cdn_url.as_deref(),
        Some("https://cdn.example.com/optimized/photo_optimized.webp")
    );
    assert_eq!(
        run.variants,
        vec![
            "thumbnails/photo_large.webp",
            "thumbnails/photo_medium.webp",
            "thumbnails/photo_small.webp",
        ]
    );

    let summary = run.optimization.clone().unwrap();
    assert_eq!(summary.original_size, 1000);
    assert_eq!(summary.optimized_size, 500);
    assert_eq!(summary.thumbnails_generated, 3);
    assert!((summary.reduction_percent - 50.0).abs() < f64::EPSILON);

    let requests = h.cdn.purge_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].paths,
        vec![
            "/originals/photo.jpg",
            "/optimized/photo_optimized.webp",
            "/thumbnails/photo_large.webp",
            "/thumbnails/photo_medium.webp",
            "/thumbnails/photo_small.webp",
        ]
    );
    assert_eq!(run.purge_job.as_ref(), Some(&requests[0].job_id));
    assert_eq!(h.store.inner().object_count(), 5);
    assert_eq!(h.codec.calls(), 4);
    assert_eq!(h.cdn.poll_count(), 0);
}

#[tokio::test]
async fn thumbnails_are_optional() {
    let h = Harness::new();
    let path = h.file("banner.png", &payload(64));

    let run = h.pipeline.process_asset(&path, false, None).await;

    assert!(run.success());
    assert_eq!(
        run.steps_completed(),
        &[Step::UploadOriginal, Step::OptimizeImage, Step::CdnSync]
    );
    assert!(run.variants.is_empty());
    assert_eq!(h.store.inner().object_count(), 2);
}

#[tokio::test]
async fn bad_variant_fails_run_after_original_upload() {
    let h = Harness::new();
    let path = h.file("photo.jpg", &payload(100));
    let specs = [
        VariantSpec::new("large", 1920, 1080),
        VariantSpec::new("broken", -1, 100),
    ];

    let run = h.pipeline.process_asset(&path, true, Some(&specs)).await;

    assert!(!run.success());
    assert_eq!(run.state(), RunState::Failed);
    assert_eq!(run.steps_completed(), &[Step::UploadOriginal]);
    assert!(!run.has_completed(Step::GenerateThumbnails));
    assert_eq!(run.variants, vec!["thumbnails/photo_large.webp"]);
    assert_eq!(run.error().map(|f| f.kind), Some(ErrorKind::LocalInput));
    assert!(run.cdn_url.is_none());
    assert_eq!(h.cdn.purge_count(), 0);
}

#[tokio::test]
async fn unreadable_source_completes_no_step() {
    let h = Harness::new();

    let run = h
        .pipeline
        .process_asset(&h.dir.path().join("missing.jpg"), true, None)
        .await;

    assert!(!run.success());
    assert!(run.steps_completed().is_empty());
    assert_eq!(run.error().map(|f| f.kind), Some(ErrorKind::LocalInput));
    assert_eq!(h.store.put_calls(), 0);
}

#[tokio::test]
async fn rejected_original_keeps_provider_code() {
    let h = Harness::with(
        PipelineConfig::default(),
        FlakyStore::new(["media"]).reject_keys_containing("originals/"),
        ScriptedCdn::new(),
    );
    let path = h.file("photo.jpg", &payload(100));

    let run = h.pipeline.process_asset(&path, true, None).await;

    assert!(run.steps_completed().is_empty());
    let error = run.error().unwrap();
    assert_eq!(error.kind, ErrorKind::RemoteRejection);
    assert_eq!(error.code.as_deref(), Some("AccessDenied"));
    assert_eq!(h.codec.calls(), 0);
}

#[tokio::test]
async fn undecodable_image_fails_at_optimize() {
    let h = Harness::new();
    let mut bytes = CORRUPT_MARKER.to_vec();
    bytes.extend(payload(32));
    let path = h.file("broken.png", &bytes);

    let run = h.pipeline.process_asset(&path, false, None).await;

    assert_eq!(run.steps_completed(), &[Step::UploadOriginal]);
    assert!(run.error().unwrap().message.starts_with("optimize_image failed"));
    assert!(run.optimization.is_none());
}

#[tokio::test]
async fn waiting_for_purge_completes_cdn_sync() {
    let h = Harness::with(
        PipelineConfig::default().with_wait_for_purge(true),
        FlakyStore::new(["media"]),
        ScriptedCdn::new(),
    );
    let path = h.file("photo.jpg", &payload(100));

    let run = h.pipeline.process_asset(&path, false, None).await;

    assert!(run.success());
    assert_eq!(h.cdn.poll_count(), 1);
}

#[tokio::test]
async fn failed_purge_wait_fails_cdn_sync() {
    let h = Harness::with(
        PipelineConfig::default().with_wait_for_purge(true),
        FlakyStore::new(["media"]),
        ScriptedCdn::new().with_reports([PurgeStatusReport::failed("edge unreachable")]),
    );
    let path = h.file("photo.jpg", &payload(100));

    let run = h.pipeline.process_asset(&path, false, None).await;

    assert!(!run.success());
    assert_eq!(
        run.steps_completed(),
        &[Step::UploadOriginal, Step::OptimizeImage]
    );
    assert_eq!(run.error().and_then(|f| f.code.as_deref()), Some("PurgeFailed"));
    assert!(run.cdn_url.is_none());
}

#[tokio::test]
async fn deploy_tree_collects_failures_and_purges_once() {
    let h = Harness::with(
        PipelineConfig::default(),
        FlakyStore::new(["media"]).reject_keys_containing("private/"),
        ScriptedCdn::new(),
    );
    let site = h.dir.path().join("site");
    write_tree(
        &site,
        &[
            ("index.html", b"<html></html>".as_slice()),
            ("img/logo.png", &payload(200)),
            ("private/secret.txt", b"nope".as_slice()),
        ],
    );

    let report = h.pipeline.deploy_tree(&site, true).await;

    assert!(!report.success);
    assert_eq!(report.total_files, 3);
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.optimized, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.uploaded_files, vec!["img/logo.webp", "index.html"]);
    assert_eq!(report.optimized_images[0].file, "img/logo.png");
    assert_eq!(report.optimized_images[0].key, "img/logo.webp");
    assert_eq!(report.failed_files[0].file, "private/secret.txt");
    assert_eq!(report.failed_files[0].error.code.as_deref(), Some("AccessDenied"));

    assert_eq!(h.cdn.purge_count(), 1);
    assert_eq!(report.cdn_purged_paths, vec!["/img/logo.webp", "/index.html"]);
    assert_eq!(
        report.purge_job.as_ref(),
        Some(&h.cdn.purge_requests()[0].job_id)
    );
    assert_eq!(report.optimization_stats.total_processed, 1);
}

#[tokio::test]
async fn deploy_without_optimization_uploads_verbatim() {
    let h = Harness::new();
    let site = h.dir.path().join("site");
    write_tree(&site, &[("img/logo.PNG", &payload(200))]);

    let report = h.pipeline.deploy_tree(&site, false).await;

    assert!(report.success);
    assert_eq!(report.uploaded_files, vec!["img/logo.PNG"]);
    assert_eq!(report.optimized, 0);
    assert_eq!(h.codec.calls(), 0);
}

#[tokio::test]
async fn deploy_falls_back_to_original_when_optimization_fails() {
    let h = Harness::new();
    let site = h.dir.path().join("site");
    let mut bytes = CORRUPT_MARKER.to_vec();
    bytes.extend(payload(16));
    write_tree(&site, &[("photo.JPG", &bytes)]);

    let report = h.pipeline.deploy_tree(&site, true).await;

    assert!(report.success);
    assert_eq!(report.uploaded_files, vec!["photo.JPG"]);
    assert!(report.optimized_images.is_empty());
    let stored = h
        .pipeline
        .transfer()
        .download("media", &ObjectKey::new("photo.JPG").unwrap())
        .await
        .unwrap();
    assert_eq!(stored, bytes);
}

#[tokio::test]
async fn empty_tree_skips_purge() {
    let h = Harness::new();
    let site = h.dir.path().join("empty");
    std::fs::create_dir_all(&site).unwrap();

    let report = h.pipeline.deploy_tree(&site, true).await;

    assert!(report.success);
    assert_eq!(report.total_files, 0);
    assert!(report.purge_job.is_none());
    assert_eq!(h.cdn.purge_count(), 0);
}

#[tokio::test]
async fn missing_tree_is_reported_not_raised() {
    let h = Harness::new();

    let report = h.pipeline.deploy_tree(&h.dir.path().join("nowhere"), true).await;

    assert!(!report.success);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_files[0].error.kind, ErrorKind::LocalInput);
}

#[tokio::test]
async fn purge_failure_does_not_fail_deploy() {
    let h = Harness::with(
        PipelineConfig::default(),
        FlakyStore::new(["media"]),
        ScriptedCdn::new().with_purge_error(CdnError::rejected("Throttled", "slow down")),
    );
    let site = h.dir.path().join("site");
    write_tree(&site, &[("a.css", b"body{}".as_slice())]);

    let report = h.pipeline.deploy_tree(&site, true).await;

    assert!(report.success);
    assert!(report.purge_job.is_none());
    assert_eq!(
        report.purge_error.as_ref().and_then(|f| f.code.as_deref()),
        Some("Throttled")
    );
}

#[tokio::test]
async fn verification_needs_storage_and_edge() {
    let h = Harness::new();
    let path = h.file("photo.jpg", &payload(100));
    let run = h.pipeline.process_asset(&path, false, None).await;
    assert!(run.success());

    let stored = ObjectKey::new("optimized/photo_optimized.webp").unwrap();
    let report = h.pipeline.verify_deployment(&stored).await;
    assert!(report.verification_passed);
    assert_eq!(report.cdn_cache_state, CacheState::Hit);
    assert_eq!(
        report.cdn_url,
        "https://cdn.example.com/optimized/photo_optimized.webp"
    );

    let missing = ObjectKey::new("optimized/never.webp").unwrap();
    let report = h.pipeline.verify_deployment(&missing).await;
    assert!(!report.storage_exists);
    assert!(report.cdn_accessible);
    assert!(!report.verification_passed);
    assert!(report.storage_error.is_some());
}

#[tokio::test]
async fn verification_fails_on_non_200_probe() {
    let h = Harness::with(
        PipelineConfig::default(),
        FlakyStore::new(["media"]),
        ScriptedCdn::new().with_probe(ProbeResponse::with_status(404).with_x_cache("MISS")),
    );
    let path = h.file("photo.jpg", &payload(100));
    h.pipeline.process_asset(&path, false, None).await;

    let key = ObjectKey::new("originals/photo.jpg").unwrap();
    let report = h.pipeline.verify_deployment(&key).await;

    assert!(report.storage_exists);
    assert!(!report.cdn_accessible);
    assert!(!report.verification_passed);
    assert_eq!(report.probe.status_code, Some(404));
}

#[tokio::test]
async fn statistics_combine_optimizer_and_purges() {
    let h = Harness::new();
    for name in ["a.jpg", "b.jpg"] {
        let path = h.file(name, &payload(400));
        assert!(h.pipeline.process_asset(&path, true, None).await.success());
    }

    let stats = h.pipeline.statistics();
    assert_eq!(stats.optimizer.total_processed, 2);
    assert_eq!(stats.optimizer.total_original_size, 800);
    assert_eq!(stats.optimizer.average_reduction_percent, Some(50.0));
    assert_eq!(stats.purges.total_purges, 2);
    assert_eq!(stats.purges.total_files_purged, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_share_statistics_and_history() {
    const RUNS: usize = 16;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyStore::new(["media"]));
    let cdn = Arc::new(ScriptedCdn::new());
    let pipeline = Arc::new(MediaPipeline::new(
        PipelineConfig::default().with_wait_for_purge(true),
        store.clone(),
        cdn.clone(),
        Arc::new(FakeCodec::new()),
    ));

    let bytes = payload(400);
    let mut runs = tokio::task::JoinSet::new();
    for i in 0..RUNS {
        let name = format!("shot-{i:02}.jpg");
        write_tree(dir.path(), &[(name.as_str(), bytes.as_slice())]);
        let path = dir.path().join(name);
        let pipeline = Arc::clone(&pipeline);
        runs.spawn(async move { pipeline.process_asset(&path, true, None).await });
    }
    while let Some(joined) = runs.join_next().await {
        let run = joined.unwrap();
        assert!(run.success(), "{:?}", run.error());
    }

    let stats = pipeline.statistics();
    assert_eq!(stats.optimizer.total_processed, RUNS as u64);
    assert_eq!(stats.optimizer.total_original_size, 400 * RUNS as u64);
    assert_eq!(stats.purges.total_purges, RUNS);
    assert_eq!(stats.purges.total_files_purged, 5 * RUNS);

    let history = pipeline.cdn().history();
    let ids: std::collections::HashSet<_> = history.iter().map(|r| r.job_id.clone()).collect();
    assert_eq!(ids.len(), RUNS);
    assert_eq!(pipeline.cdn().tracked_jobs(), 0);
    assert_eq!(pipeline.cdn().archived_jobs().len(), RUNS);
    assert_eq!(store.inner().object_count(), 5 * RUNS);
}
