//! Pipeline orchestrator
//!
//! Sequences optimization, transfer and cache invalidation for one asset or
//! a whole tree. Operations never return `Err`; failures are carried inside
//! the returned run or report.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::run::{
    DeploymentReport, FailedFile, OptimizationSummary, OptimizedImage, PipelineRun,
    PipelineStatistics, VerificationReport,
};
use crate::step::Step;
use mdp_cdn::{CacheInvalidationEngine, CdnProvider};
use mdp_model::{Asset, Failure, ObjectKey};
use mdp_optimizer::{ImageCodec, ImageFormat, OptimizationAdapter, VariantSpec};
use mdp_transfer::{ObjectStore, TransferEngine, TransferResult, UploadSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use walkdir::WalkDir;

const ORIGINALS_PREFIX: &str = "originals";
const THUMBNAILS_PREFIX: &str = "thumbnails";
const OPTIMIZED_PREFIX: &str = "optimized";

/// Extensions re-encoded during tree deploys
const OPTIMIZABLE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Orchestrates the transfer, CDN and optimizer components
///
/// Share between tasks through `Arc`; every component is internally
/// synchronized.
pub struct MediaPipeline {
    config: PipelineConfig,
    transfer: TransferEngine,
    cdn: CacheInvalidationEngine,
    optimizer: OptimizationAdapter,
}

impl std::fmt::Debug for MediaPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MediaPipeline {
    /// Build components from `config` over the given capabilities
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn CdnProvider>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        let transfer = TransferEngine::new(store, config.transfer.clone());
        let cdn = CacheInvalidationEngine::new(provider, config.cdn.clone());
        let optimizer = OptimizationAdapter::new(codec);
        Self::from_parts(config, transfer, cdn, optimizer)
    }

    /// Assemble from prebuilt components
    #[must_use]
    pub fn from_parts(
        config: PipelineConfig,
        transfer: TransferEngine,
        cdn: CacheInvalidationEngine,
        optimizer: OptimizationAdapter,
    ) -> Self {
        Self {
            config,
            transfer,
            cdn,
            optimizer,
        }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the transfer engine
    #[inline]
    #[must_use]
    pub fn transfer(&self) -> &TransferEngine {
        &self.transfer
    }

    /// Get the cache invalidation engine
    #[inline]
    #[must_use]
    pub fn cdn(&self) -> &CacheInvalidationEngine {
        &self.cdn
    }

    /// Get the optimization adapter
    #[inline]
    #[must_use]
    pub fn optimizer(&self) -> &OptimizationAdapter {
        &self.optimizer
    }

    fn bucket(&self) -> &str {
        &self.config.pipeline.bucket
    }

    fn cdn_url(&self, key: &str) -> String {
        format!("{}/{}", self.config.pipeline.cdn_domain, key)
    }

    /// Run one file through every step
    ///
    /// `variant_specs` replaces the configured thumbnails when given; it is
    /// ignored unless `generate_variants` is set.
    pub async fn process_asset(
        &self,
        path: &Path,
        generate_variants: bool,
        variant_specs: Option<&[VariantSpec]>,
    ) -> PipelineRun {
        let started = Instant::now();
        let mut run = PipelineRun::start(path);
        tracing::info!(run = %run.id(), "Processing {}", path.display());

        let steps = self
            .run_steps(&mut run, path, generate_variants, variant_specs)
            .await;
        let outcome = steps.and_then(|()| run.succeed().map_err(PipelineError::from));
        run.elapsed_ms = elapsed_ms(started);

        match outcome {
            Ok(()) => tracing::info!(
                run = %run.id(),
                elapsed_ms = run.elapsed_ms,
                "Processed {}",
                path.display()
            ),
            Err(err) => {
                tracing::error!(
                    run = %run.id(),
                    steps = run.steps_completed().len(),
                    "Processing {} failed: {}",
                    path.display(),
                    err
                );
                run.fail(err.to_failure());
            }
        }
        run
    }

    async fn run_steps(
        &self,
        run: &mut PipelineRun,
        path: &Path,
        generate_variants: bool,
        variant_specs: Option<&[VariantSpec]>,
    ) -> Result<(), PipelineError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let original_key = ObjectKey::join(ORIGINALS_PREFIX, &file_name)?;
        let asset = Asset::load(path, original_key.clone()).await?;
        let mut written = Vec::new();

        // upload_original
        let uploaded = self.upload_bytes(asset.payload().to_vec(), &original_key).await;
        let uploaded = require(uploaded, Step::UploadOriginal)?;
        run.storage_url = uploaded.url;
        written.push(original_key.cdn_path());
        run.complete(Step::UploadOriginal)?;

        // generate_thumbnails
        let mut thumbnail_paths = Vec::new();
        if generate_variants {
            let opts = &self.config.optimizer;
            let specs = variant_specs.unwrap_or(opts.thumbnails.as_slice());
            let outcomes = self
                .optimizer
                .generate_variants(&asset, specs, opts.thumbnail_format, opts.thumbnail_quality)
                .await;

            let mut first_failure = None;
            for outcome in outcomes {
                let failure = match outcome.bytes {
                    Some(bytes) if outcome.success => {
                        let key = ObjectKey::join(THUMBNAILS_PREFIX, &outcome.file_name)?;
                        let result = self.upload_bytes(bytes, &key).await;
                        if result.success {
                            thumbnail_paths.push(key.cdn_path());
                            run.variants.push(key.as_str().to_string());
                            continue;
                        }
                        result.error
                    }
                    _ => outcome.error,
                };
                first_failure.get_or_insert_with(|| {
                    failure.unwrap_or_else(|| {
                        Failure::local_input(format!("variant '{}' not produced", outcome.name))
                    })
                });
            }

            if let Some(failure) = first_failure {
                return Err(PipelineError::step(Step::GenerateThumbnails, failure));
            }
            run.complete(Step::GenerateThumbnails)?;
        }

        // optimize_image
        let opts = &self.config.optimizer;
        let (bytes, result) = self
            .optimizer
            .optimize(
                &asset,
                opts.optimized_format,
                opts.optimized_quality,
                opts.max_dimension,
            )
            .await;
        if !result.success {
            let failure = result
                .error
                .unwrap_or_else(|| Failure::local_input("optimization did not run"));
            return Err(PipelineError::step(Step::OptimizeImage, failure));
        }
        let optimized_key = ObjectKey::join(
            OPTIMIZED_PREFIX,
            &format!(
                "{}_optimized.{}",
                asset.stem(),
                opts.optimized_format.extension()
            ),
        )?;
        let uploaded = self.upload_bytes(bytes, &optimized_key).await;
        require(uploaded, Step::OptimizeImage)?;
        run.optimization = Some(OptimizationSummary {
            original_size: result.original_size,
            optimized_size: result.optimized_size,
            reduction_percent: result.reduction_percent,
            thumbnails_generated: run.variants.len(),
        });
        written.push(optimized_key.cdn_path());
        run.complete(Step::OptimizeImage)?;

        // cdn_sync
        written.extend(thumbnail_paths);
        let purge = self.cdn.smart_purge(&written).await;
        if !purge.success {
            let failure = purge
                .error
                .unwrap_or_else(|| Failure::local_input("purge was not accepted"));
            return Err(PipelineError::step(Step::CdnSync, failure));
        }
        run.purge_job = purge.job_id().cloned();
        if self.config.pipeline.wait_for_purge {
            if let Some(job_id) = purge.job_id() {
                let outcome = self.cdn.wait_with_defaults(job_id).await;
                if let Some(failure) = outcome.to_failure() {
                    return Err(PipelineError::step(Step::CdnSync, failure));
                }
            }
        }
        run.cdn_url = Some(self.cdn_url(optimized_key.as_str()));
        run.complete(Step::CdnSync)?;
        Ok(())
    }

    /// Deploy every regular file under `source_dir`
    ///
    /// Keys mirror paths relative to `source_dir`. Per-file failures are
    /// collected, then a single purge covers every uploaded path.
    pub async fn deploy_tree(&self, source_dir: &Path, optimize_images: bool) -> DeploymentReport {
        let started = Instant::now();
        tracing::info!(
            optimize = optimize_images,
            "Deploying {}",
            source_dir.display()
        );

        let (files, walk_failures) = walk_files(source_dir.to_path_buf()).await;

        let mut uploaded_files = Vec::new();
        let mut optimized_images = Vec::new();
        let mut failed_files = walk_failures;
        let mut purge_paths = Vec::new();

        for path in files {
            let relative = path.strip_prefix(source_dir).unwrap_or(&path).to_path_buf();
            let relative_name = relative.to_string_lossy().replace('\\', "/");
            match self
                .deploy_file(&path, &relative, optimize_images, &relative_name)
                .await
            {
                Ok((key, optimized)) => {
                    if let Some(image) = optimized {
                        optimized_images.push(image);
                    }
                    purge_paths.push(key.cdn_path());
                    uploaded_files.push(key.as_str().to_string());
                }
                Err(failure) => {
                    tracing::warn!(file = %relative_name, "Deploy failed: {}", failure);
                    failed_files.push(FailedFile {
                        file: relative_name,
                        error: failure,
                    });
                }
            }
        }

        let purge = self.cdn.smart_purge(&purge_paths).await;
        if let Some(error) = &purge.error {
            tracing::warn!("Batch purge after deploy failed: {}", error);
        }

        let report = DeploymentReport {
            success: failed_files.is_empty(),
            total_files: uploaded_files.len() + failed_files.len(),
            uploaded: uploaded_files.len(),
            optimized: optimized_images.len(),
            failed: failed_files.len(),
            duration_ms: elapsed_ms(started),
            uploaded_files,
            optimized_images,
            failed_files,
            cdn_purged_paths: purge_paths,
            purge_job: purge.job_id().cloned(),
            purge_status: purge.job.as_ref().map(|j| j.status),
            purge_error: purge.error,
            optimization_stats: self.optimizer.statistics(),
        };
        tracing::info!(
            uploaded = report.uploaded,
            optimized = report.optimized,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Deployed {}",
            source_dir.display()
        );
        report
    }

    async fn deploy_file(
        &self,
        path: &Path,
        relative: &Path,
        optimize_images: bool,
        relative_name: &str,
    ) -> Result<(ObjectKey, Option<OptimizedImage>), Failure> {
        let key = ObjectKey::from_relative_path(relative)
            .map_err(|e| PipelineError::from(e).to_failure())?;
        let mut asset = Asset::load(path, key).await.map_err(|e| e.to_failure())?;
        let mut optimized = None;

        let optimizable = asset
            .key()
            .extension()
            .is_some_and(|ext| OPTIMIZABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if optimize_images && optimizable {
            let format = ImageFormat::Webp;
            let (bytes, result) = self
                .optimizer
                .optimize(&asset, format, self.config.optimizer.deploy_quality, None)
                .await;
            if result.success {
                asset.replace_payload(bytes, Some(format.extension()));
                optimized = Some(OptimizedImage {
                    file: relative_name.to_string(),
                    key: asset.key().as_str().to_string(),
                    reduction_percent: result.reduction_percent,
                });
            }
        }

        let key = asset.key().clone();
        let result = self.upload_bytes(asset.into_payload(), &key).await;
        if !result.success {
            return Err(upload_failure(result));
        }
        Ok((key, optimized))
    }

    /// Check that `key` is stored and served by the CDN
    pub async fn verify_deployment(&self, key: &ObjectKey) -> VerificationReport {
        let head = self.transfer.head(self.bucket(), key).await;
        let cdn_url = self.cdn_url(key.as_str());
        let probe = self.cdn.test_response(&cdn_url).await;

        let storage_exists = head.success;
        let cdn_accessible = probe.is_ok_200();
        let verification_passed = storage_exists && cdn_accessible;
        if !verification_passed {
            tracing::warn!(
                storage_exists,
                cdn_accessible,
                "Verification of {} failed",
                key
            );
        }

        VerificationReport {
            key: key.as_str().to_string(),
            storage_exists,
            storage_error: head.error,
            cdn_url,
            cdn_accessible,
            cdn_cache_state: probe.cache_state,
            probe,
            verification_passed,
        }
    }

    /// Cumulative optimizer and purge counters
    #[must_use]
    pub fn statistics(&self) -> PipelineStatistics {
        PipelineStatistics {
            optimizer: self.optimizer.statistics(),
            purges: self.cdn.purge_statistics(),
        }
    }

    async fn upload_bytes(&self, bytes: Vec<u8>, key: &ObjectKey) -> TransferResult {
        self.transfer
            .upload(UploadSource::Bytes(bytes), self.bucket(), key, None, None)
            .await
    }
}

fn require(result: TransferResult, step: Step) -> Result<TransferResult, PipelineError> {
    if result.success {
        Ok(result)
    } else {
        Err(PipelineError::step(step, upload_failure(result)))
    }
}

fn upload_failure(result: TransferResult) -> Failure {
    result
        .error
        .unwrap_or_else(|| Failure::local_input(format!("upload of {} failed", result.key)))
}

/// Regular files under `root` sorted by name, plus walk failures
async fn walk_files(root: PathBuf) -> (Vec<PathBuf>, Vec<FailedFile>) {
    let root_name = root.display().to_string();
    let walked = tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        let mut failures = Vec::new();
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map_or_else(|| root.clone(), Path::to_path_buf);
                    let err = PipelineError::Walk {
                        path: path.clone(),
                        message: e.to_string(),
                    };
                    failures.push(FailedFile {
                        file: path.display().to_string(),
                        error: err.to_failure(),
                    });
                }
            }
        }
        (files, failures)
    })
    .await;

    walked.unwrap_or_else(|e| {
        let err = PipelineError::Walk {
            path: PathBuf::from(&root_name),
            message: e.to_string(),
        };
        (
            Vec::new(),
            vec![FailedFile {
                file: root_name,
                error: err.to_failure(),
            }],
        )
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
