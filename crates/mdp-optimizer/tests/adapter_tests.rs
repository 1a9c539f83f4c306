use mdp_model::{Asset, ErrorKind, ObjectKey};
use mdp_optimizer::{ImageFormat, OptimizationAdapter, OptimizationStats, VariantSpec};
use mdp_test_utils::{payload, FakeCodec, CORRUPT_MARKER};
use std::sync::Arc;

fn asset(name: &str, bytes: Vec<u8>) -> Asset {
    Asset::new(name, ObjectKey::new(name).unwrap(), bytes)
}

#[tokio::test]
async fn optimize_shrinks_and_records() {
    let codec = Arc::new(FakeCodec::new());
    let adapter = OptimizationAdapter::new(codec.clone());

    let (bytes, result) = adapter
        .optimize(&asset("hero.png", payload(1000)), ImageFormat::Webp, 85, Some(1024))
        .await;

    assert!(result.success);
    assert_eq!(bytes.len(), 500);
    assert_eq!(result.original_size, 1000);
    assert_eq!(result.optimized_size, 500);
    assert!((result.reduction_percent - 50.0).abs() < f64::EPSILON);
    assert_eq!(result.dimensions, (1024, 1024));
    assert_eq!(codec.calls(), 1);
}

#[tokio::test]
async fn codec_failure_returns_original_bytes() {
    let adapter = OptimizationAdapter::new(Arc::new(FakeCodec::new()));
    let mut bytes = CORRUPT_MARKER.to_vec();
    bytes.extend(payload(10));

    let (out, result) = adapter
        .optimize(&asset("bad.jpg", bytes.clone()), ImageFormat::Webp, 80, None)
        .await;

    assert_eq!(out, bytes);
    assert!(!result.success);
    assert_eq!(result.optimized_size, result.original_size);
    assert_eq!(result.error.map(|f| f.kind), Some(ErrorKind::LocalInput));
    assert_eq!(adapter.statistics().total_processed, 0);
}

#[tokio::test]
async fn adapters_share_injected_stats() {
    let stats = Arc::new(OptimizationStats::new());
    let first = OptimizationAdapter::with_stats(Arc::new(FakeCodec::new()), stats.clone());
    let second = OptimizationAdapter::with_stats(Arc::new(FakeCodec::new()), stats.clone());

    first
        .optimize(&asset("a.png", payload(400)), ImageFormat::Webp, 80, None)
        .await;
    second
        .optimize(&asset("b.png", payload(600)), ImageFormat::Webp, 80, None)
        .await;

    let snap = stats.snapshot();
    assert_eq!(snap.total_processed, 2);
    assert_eq!(snap.total_original_size, 1000);
    assert_eq!(snap.total_optimized_size, 500);
    assert_eq!(snap.total_reduction_bytes, Some(500));
    assert_eq!(snap.average_reduction_percent, Some(50.0));
}

#[tokio::test]
async fn invalid_variant_skips_codec_and_others_continue() {
    let codec = Arc::new(FakeCodec::new());
    let adapter = OptimizationAdapter::new(codec.clone());
    let specs = [
        VariantSpec::new("large", 1920, 1080),
        VariantSpec::new("broken", -640, 360),
        VariantSpec::new("small", 640, 360),
    ];

    let outcomes = adapter
        .generate_variants(&asset("photo.jpg", payload(100)), &specs, ImageFormat::Webp, 80)
        .await;

    assert_eq!(codec.calls(), 2);
    assert_eq!(
        outcomes.iter().map(|o| o.success).collect::<Vec<_>>(),
        vec![true, false, true]
    );
    assert_eq!(outcomes[2].dimensions, (640, 360));
    assert_eq!(outcomes[2].file_name, "photo_small.webp");
    assert_eq!(outcomes[0].bytes.as_ref().map(Vec::len), Some(50));
    assert_eq!(adapter.statistics().total_processed, 0);
}
