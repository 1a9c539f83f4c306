//! Run records and reports

use crate::error::StepOrderError;
use crate::step::{validate_transition, RunState, Step};
use mdp_cdn::{CacheState, ProbeResult, PurgeJobId, PurgeStatistics, PurgeStatus};
use mdp_model::Failure;
use mdp_optimizer::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// Unique id of one `process_asset` run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a fresh id
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// Per-run optimization summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    /// Source size in bytes
    pub original_size: u64,
    /// Optimized size in bytes
    pub optimized_size: u64,
    /// Two decimals
    pub reduction_percent: f64,
    /// Variants uploaded
    pub thumbnails_generated: usize,
}

/// Record of one `process_asset` invocation
///
/// Completed steps only grow, and only in canonical order; [`complete`]
/// refuses anything else.
///
/// [`complete`]: PipelineRun::complete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    id: RunId,
    source: PathBuf,
    state: RunState,
    steps_completed: Vec<Step>,
    success: bool,
    error: Option<Failure>,
    /// Storage URL of the uploaded original
    pub storage_url: Option<String>,
    /// Public URL of the optimized rendition, set once the cache is synced
    pub cdn_url: Option<String>,
    /// Sizes and reduction of the optimized rendition
    pub optimization: Option<OptimizationSummary>,
    /// Keys of uploaded variants
    pub variants: Vec<String>,
    /// Purge job issued during `cdn_sync`
    pub purge_job: Option<PurgeJobId>,
    /// Wall time of the run
    pub elapsed_ms: u64,
}

impl PipelineRun {
    /// Begin a run for `source`
    #[must_use]
    pub fn start(source: impl Into<PathBuf>) -> Self {
        Self {
            id: RunId::generate(),
            source: source.into(),
            state: RunState::Started,
            steps_completed: Vec::new(),
            success: false,
            error: None,
            storage_url: None,
            cdn_url: None,
            optimization: None,
            variants: Vec::new(),
            purge_job: None,
            elapsed_ms: 0,
        }
    }

    /// Record `step` as done
    ///
    /// # Errors
    /// [`StepOrderError`] if the step is out of order or the run is over
    pub fn complete(&mut self, step: Step) -> Result<(), StepOrderError> {
        let next = step.completes_into();
        validate_transition(self.state, next)?;
        self.steps_completed.push(step);
        self.state = next;
        Ok(())
    }

    /// Close the run as succeeded
    ///
    /// # Errors
    /// [`StepOrderError`] unless the cache was synced
    pub fn succeed(&mut self) -> Result<(), StepOrderError> {
        validate_transition(self.state, RunState::Succeeded)?;
        self.state = RunState::Succeeded;
        self.success = true;
        Ok(())
    }

    /// Close the run as failed, keeping completed steps
    ///
    /// No effect on a run that already ended.
    pub fn fail(&mut self, failure: Failure) {
        if self.state.is_terminal() {
            return;
        }
        self.state = RunState::Failed;
        self.success = false;
        self.error = Some(failure);
    }

    /// Run id
    #[inline]
    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Source path
    #[inline]
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Completed steps in execution order
    #[inline]
    #[must_use]
    pub fn steps_completed(&self) -> &[Step] {
        &self.steps_completed
    }

    /// Whether the run succeeded
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    /// Failure of a failed run
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&Failure> {
        self.error.as_ref()
    }

    /// Whether `step` is among the completed steps
    #[must_use]
    pub fn has_completed(&self, step: Step) -> bool {
        self.steps_completed.contains(&step)
    }
}

/// One image re-encoded during a tree deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedImage {
    /// Path relative to the deployed root
    pub file: String,
    /// Key the optimized bytes were uploaded under
    pub key: String,
    /// Two decimals
    pub reduction_percent: f64,
}

/// One file that did not deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    /// Path relative to the deployed root, or the walk path on walk errors
    pub file: String,
    /// Why it failed
    pub error: Failure,
}

/// Outcome of `deploy_tree`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentReport {
    /// No file failed
    pub success: bool,
    /// Files attempted, uploaded plus failed
    pub total_files: usize,
    /// Files written to storage
    pub uploaded: usize,
    /// Images re-encoded before upload
    pub optimized: usize,
    /// Files that did not deploy
    pub failed: usize,
    /// Wall time
    pub duration_ms: u64,
    /// Keys written
    pub uploaded_files: Vec<String>,
    /// Re-encoded images
    pub optimized_images: Vec<OptimizedImage>,
    /// Per-file failures
    pub failed_files: Vec<FailedFile>,
    /// Paths handed to the batch purge
    pub cdn_purged_paths: Vec<String>,
    /// Batch purge job
    pub purge_job: Option<PurgeJobId>,
    /// Status when the job was accepted
    pub purge_status: Option<PurgeStatus>,
    /// Purge problems; these do not fail the deploy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge_error: Option<Failure>,
    /// Cumulative optimizer totals after the deploy
    pub optimization_stats: StatsSnapshot,
}

/// Outcome of `verify_deployment`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    /// Verified key
    pub key: String,
    /// Object found in storage
    pub storage_exists: bool,
    /// Metadata read failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<Failure>,
    /// Probed URL
    pub cdn_url: String,
    /// Probe answered `200 OK`
    pub cdn_accessible: bool,
    /// Cache state seen by the probe
    pub cdn_cache_state: CacheState,
    /// Raw probe
    pub probe: ProbeResult,
    /// Stored and reachable
    pub verification_passed: bool,
}

/// Pipeline-wide counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatistics {
    /// Cumulative optimization totals
    pub optimizer: StatsSnapshot,
    /// Purge history aggregate
    pub purges: PurgeStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdp_model::ErrorKind;
    use proptest::prelude::*;

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop::sample::select(Step::ORDER.to_vec())
    }

    #[test]
    fn full_run_succeeds() {
        let mut run = PipelineRun::start("a.jpg");
        for step in Step::ORDER {
            run.complete(step).unwrap();
        }
        run.succeed().unwrap();
        assert!(run.success());
        assert_eq!(run.state(), RunState::Succeeded);
        assert_eq!(run.steps_completed(), &Step::ORDER);
    }

    #[test]
    fn out_of_order_step_is_rejected() {
        let mut run = PipelineRun::start("a.jpg");
        assert!(run.complete(Step::OptimizeImage).is_err());
        run.complete(Step::UploadOriginal).unwrap();
        run.complete(Step::OptimizeImage).unwrap();
        let err = run.complete(Step::GenerateThumbnails).unwrap_err();
        assert_eq!(err.from, RunState::Optimized);
        assert_eq!(
            run.steps_completed(),
            &[Step::UploadOriginal, Step::OptimizeImage]
        );
    }

    #[test]
    fn failure_keeps_prefix_and_is_final() {
        let mut run = PipelineRun::start("a.jpg");
        run.complete(Step::UploadOriginal).unwrap();
        run.fail(Failure::local_input("bad variant"));
        run.fail(Failure::timeout("ignored"));

        assert_eq!(run.state(), RunState::Failed);
        assert!(!run.success());
        assert_eq!(run.error().map(|f| f.kind), Some(ErrorKind::LocalInput));
        assert_eq!(run.steps_completed(), &[Step::UploadOriginal]);
        assert!(run.complete(Step::OptimizeImage).is_err());
        assert!(run.succeed().is_err());
    }

    #[test]
    fn run_ids_render_with_prefix() {
        let id = RunId::generate();
        assert!(id.to_string().starts_with("run_"));
        assert_ne!(id, RunId::generate());
    }

    proptest! {
        #[test]
        fn completed_steps_are_always_a_canonical_prefix(
            attempts in prop::collection::vec(step_strategy(), 0..12),
            fail_at in prop::option::of(0usize..12),
        ) {
            let mut run = PipelineRun::start("p.png");
            for (i, step) in attempts.into_iter().enumerate() {
                if fail_at == Some(i) {
                    run.fail(Failure::local_input("stop"));
                }
                let _ = run.complete(step);
            }

            let positions: Vec<usize> = run
                .steps_completed()
                .iter()
                .map(|s| Step::ORDER.iter().position(|o| o == s).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
            if let Some(first) = positions.first() {
                prop_assert_eq!(*first, 0);
            }
            if run.has_completed(Step::CdnSync) {
                prop_assert!(run.has_completed(Step::OptimizeImage));
            }
            if run.has_completed(Step::OptimizeImage) {
                prop_assert!(run.has_completed(Step::UploadOriginal));
            }
        }
    }
}
