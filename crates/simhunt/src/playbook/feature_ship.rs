//! Feature Ship Loop: build, install, launch, navigate, verify; repeat.
//!
//! The loop stops as soon as every assertion holds in one iteration. A
//! failed rebuild ends the run with `build_failed`; assertion failures are
//! recorded and the next iteration tries again until `max_iterations`.

use super::controller::{
    IterationOutcome, Phase, PlaybookOutcome, PlaybookRunner, PlaybookStrategy, RunContext,
    RunOptions, StartFailure, TerminationReason,
};
use super::setup::{build_app, install_app, provision, AppSource};
use crate::driver::Toolchain;
use crate::navigation::{NavigationStep, Navigator};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::report::feature_ship as report;
use crate::result::{SimhuntError, SimhuntResult};
use crate::verify::{Assertion, AssertionOutcome, AssertionVerifier, UiTreeVerifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Most iterations accepted
pub const MAX_ITERATIONS: u32 = 100;

/// Sleeps and timeouts used by the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureShipTiming {
    /// Wait after each launch
    pub launch_settle_ms: u64,
    /// Wait between iterations
    pub iteration_delay_ms: u64,
    /// How long each assertion may take to hold
    pub assertion_timeout_ms: u64,
}

impl Default for FeatureShipTiming {
    fn default() -> Self {
        Self {
            launch_settle_ms: 2_000,
            iteration_delay_ms: 1_000,
            assertion_timeout_ms: 5_000,
        }
    }
}

impl FeatureShipTiming {
    /// No waiting; assertions get a single look
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            launch_settle_ms: 0,
            iteration_delay_ms: 0,
            assertion_timeout_ms: 0,
        }
    }
}

/// Feature Ship Loop options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureShipOptions {
    /// App under test; `bundle_id` is required
    #[serde(flatten)]
    pub source: AppSource,
    /// Shared run options
    #[serde(flatten)]
    pub run: RunOptions,
    /// Conditions that must all hold
    pub assertions: Vec<Assertion>,
    /// Steps that bring the feature on screen
    pub navigation: Vec<NavigationStep>,
    /// Iteration budget, 1..=100
    pub max_iterations: u32,
    /// Check the remaining assertions after one fails
    pub continue_on_assertion_failure: bool,
    /// Screenshot the screen when an iteration fails
    pub screenshot_on_failure: bool,
    /// Sleeps and timeouts
    pub timing: FeatureShipTiming,
}

impl Default for FeatureShipOptions {
    fn default() -> Self {
        Self {
            source: AppSource::default(),
            run: RunOptions::default(),
            assertions: Vec::new(),
            navigation: Vec::new(),
            max_iterations: 10,
            continue_on_assertion_failure: true,
            screenshot_on_failure: true,
            timing: FeatureShipTiming::default(),
        }
    }
}

impl FeatureShipOptions {
    /// Ship against an installed app
    #[must_use]
    pub fn for_bundle(bundle_id: impl Into<String>) -> Self {
        Self {
            source: AppSource::installed(bundle_id),
            ..Self::default()
        }
    }

    /// Rebuild from a project every iteration
    #[must_use]
    pub fn with_project(
        mut self,
        project_path: impl Into<PathBuf>,
        scheme: impl Into<String>,
    ) -> Self {
        self.source.project_path = Some(project_path.into());
        self.source.scheme = Some(scheme.into());
        self
    }

    /// Add an assertion
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Add a navigation step
    #[must_use]
    pub fn with_step(mut self, step: NavigationStep) -> Self {
        self.navigation.push(step);
        self
    }

    /// Set the iteration budget
    #[must_use]
    pub const fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    /// Keep checking after the first failed assertion
    #[must_use]
    pub const fn with_continue_on_assertion_failure(mut self, keep_going: bool) -> Self {
        self.continue_on_assertion_failure = keep_going;
        self
    }

    /// Set the sleeps and timeouts
    #[must_use]
    pub const fn with_timing(mut self, timing: FeatureShipTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Set the artifacts root
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run.artifacts_dir = dir.into();
        self
    }

    /// Validate only
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.run.dry_run = dry_run;
        self
    }

    /// Send progress events here
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.run.progress = progress;
        self
    }

    /// Check every option
    pub fn validate(&self) -> SimhuntResult<()> {
        self.source.validate(false)?;
        if self.source.bundle_id.is_none() {
            return Err(SimhuntError::validation("bundle_id is required"));
        }
        if self.assertions.is_empty() {
            return Err(SimhuntError::validation("at least one assertion is required"));
        }
        if !(1..=MAX_ITERATIONS).contains(&self.max_iterations) {
            return Err(SimhuntError::validation(format!(
                "max_iterations must be between 1 and {MAX_ITERATIONS}, got {}",
                self.max_iterations
            )));
        }
        Ok(())
    }
}

/// What happened in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipIteration {
    /// 1-based iteration number
    pub iteration: u32,
    /// Whether the app was rebuilt and reinstalled first
    pub rebuilt: bool,
    /// First failing navigation step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_error: Option<String>,
    /// Assertion outcomes in check order
    pub assertions: Vec<AssertionOutcome>,
    /// Passing assertions
    pub passed: u32,
    /// Failing assertions
    pub failed: u32,
    /// Assertions skipped after a failure
    pub skipped: u32,
    /// Screenshot of a failed iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    /// Time spent
    pub duration_ms: u64,
}

impl ShipIteration {
    /// Every assertion was checked and held
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.passed > 0
    }
}

/// Feature Ship Loop result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureShipResult {
    /// The loop ran to a natural end
    pub completed: bool,
    /// Why it stopped
    pub termination_reason: TerminationReason,
    /// Simulator name
    pub simulator: Option<String>,
    /// App
    pub bundle_id: Option<String>,
    /// Configured budget
    pub max_iterations: u32,
    /// Always equals `iterations.len()`
    pub iterations_run: u32,
    /// Per-iteration detail
    pub iterations: Vec<ShipIteration>,
    /// Builds performed, initial build included
    pub builds: u32,
    /// Actual run time
    pub elapsed_ms: u64,
    /// Run directory
    pub artifacts_dir: Option<PathBuf>,
    /// Error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeatureShipResult {
    fn empty(reason: TerminationReason, options: &FeatureShipOptions) -> Self {
        Self {
            completed: false,
            termination_reason: reason,
            simulator: None,
            bundle_id: options.source.bundle_id.clone(),
            max_iterations: options.max_iterations,
            iterations_run: 0,
            iterations: Vec::new(),
            builds: 0,
            elapsed_ms: 0,
            artifacts_dir: None,
            error: None,
        }
    }

    /// Outcomes of the last iteration
    #[must_use]
    pub fn last_assertions(&self) -> &[AssertionOutcome] {
        self.iterations.last().map_or(&[], |i| i.assertions.as_slice())
    }
}

#[derive(Debug, Default)]
struct ShipLoopState {
    bundle_id: String,
    builds: u32,
    iterations: Vec<ShipIteration>,
}

/// Feature Ship Loop strategy
pub struct FeatureShip {
    options: FeatureShipOptions,
    verifier: Arc<dyn AssertionVerifier>,
    state: ShipLoopState,
}

impl std::fmt::Debug for FeatureShip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureShip")
            .field("options", &self.options)
            .field("iterations", &self.state.iterations.len())
            .finish_non_exhaustive()
    }
}

impl FeatureShip {
    /// Create a loop checking assertions through `verifier`
    #[must_use]
    pub fn new(options: FeatureShipOptions, verifier: Arc<dyn AssertionVerifier>) -> Self {
        let state = ShipLoopState {
            bundle_id: options.source.bundle_id.clone().unwrap_or_default(),
            ..ShipLoopState::default()
        };
        Self {
            options,
            verifier,
            state,
        }
    }

    async fn rebuild(&mut self, ctx: &RunContext) -> SimhuntResult<Option<String>> {
        self.state.builds += 1;
        let app = match build_app(ctx, &self.options.source).await {
            Ok(app) => app,
            Err(SimhuntError::Build { message }) => return Ok(Some(message)),
            Err(e) => return Err(e),
        };
        install_app(ctx, &app, Some(&self.state.bundle_id)).await?;
        Ok(None)
    }

    async fn verify_all(&self, ctx: &RunContext, iteration: u32) -> (Vec<AssertionOutcome>, u32) {
        let timeout = Duration::from_millis(self.options.timing.assertion_timeout_ms);
        let mut outcomes = Vec::with_capacity(self.options.assertions.len());
        for assertion in &self.options.assertions {
            let outcome = self
                .verifier
                .verify(ctx.udid(), &self.state.bundle_id, assertion, timeout)
                .await;
            tracing::debug!(
                iteration,
                assertion = %outcome.description,
                passed = outcome.passed,
                "assertion checked"
            );
            ctx.emit(ProgressEvent::AssertionChecked {
                iteration,
                outcome: outcome.clone(),
            });
            let failed = !outcome.passed;
            outcomes.push(outcome);
            if failed && !self.options.continue_on_assertion_failure {
                break;
            }
        }
        let skipped = (self.options.assertions.len() - outcomes.len()) as u32;
        (outcomes, skipped)
    }

    async fn failure_screenshot(&self, ctx: &RunContext, iteration: u32) -> Option<PathBuf> {
        if !self.options.screenshot_on_failure {
            return None;
        }
        let dir = ctx.run_dir.join("iterations");
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(error = %e, "cannot create iteration screenshot directory");
            return None;
        }
        let path = dir.join(format!("iteration-{iteration}.png"));
        match ctx.toolchain.capture.screenshot(ctx.udid(), &path).await {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(iteration, error = %e, "failure screenshot not captured");
                None
            }
        }
    }
}

#[async_trait]
impl PlaybookStrategy for FeatureShip {
    type Output = FeatureShipResult;

    fn name(&self) -> &'static str {
        "feature_ship"
    }

    fn report_name(&self) -> &'static str {
        "feature_ship_report"
    }

    fn run_options(&self) -> &RunOptions {
        &self.options.run
    }

    fn validate(&self) -> SimhuntResult<()> {
        self.options.validate()
    }

    fn dry_run(&self) -> FeatureShipResult {
        FeatureShipResult::empty(TerminationReason::DryRun, &self.options)
    }

    fn failed_before_start(&self, failure: StartFailure) -> FeatureShipResult {
        let mut result = FeatureShipResult::empty(failure.reason, &self.options);
        result.simulator = failure.simulator;
        result.builds = self.state.builds;
        result.elapsed_ms = failure.elapsed_ms;
        result.artifacts_dir = failure.artifacts_dir;
        result.error = Some(failure.error);
        result
    }

    async fn prepare(&mut self, ctx: &mut RunContext) -> SimhuntResult<()> {
        if self.options.source.is_buildable() {
            self.state.builds += 1;
        }
        self.state.bundle_id = provision(ctx, &self.options.source).await?;
        Ok(())
    }

    async fn run_iteration(
        &mut self,
        ctx: &mut RunContext,
        iteration: u32,
    ) -> SimhuntResult<IterationOutcome> {
        let started = Instant::now();
        let rebuilt = iteration > 1 && self.options.source.is_buildable();
        if rebuilt {
            if let Some(message) = self.rebuild(ctx).await? {
                return Ok(IterationOutcome::Fail {
                    reason: TerminationReason::BuildFailed,
                    error: message,
                });
            }
        }

        let udid = ctx.udid().to_string();
        let bundle_id = self.state.bundle_id.clone();
        ctx.phase(
            Phase::Launching,
            format!("iteration {iteration}: launching {bundle_id}"),
        );
        if let Err(e) = ctx.toolchain.device.terminate_app(&udid, &bundle_id).await {
            tracing::debug!(error = %e, "terminate before launch failed");
        }
        ctx.toolchain.device.launch_app(&udid, &bundle_id).await?;
        if self.options.timing.launch_settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.timing.launch_settle_ms)).await;
        }

        let navigation_error = if self.options.navigation.is_empty() {
            None
        } else {
            Navigator::new(
                ctx.toolchain.device.as_ref(),
                ctx.toolchain.inspector.as_ref(),
                &udid,
                &bundle_id,
            )
            .run(&self.options.navigation)
            .await
            .err()
        };
        if let Some(error) = &navigation_error {
            tracing::warn!(iteration, %error, "navigation failed, verifying anyway");
        }

        ctx.phase(
            Phase::Verifying,
            format!(
                "iteration {iteration}: checking {} assertions",
                self.options.assertions.len()
            ),
        );
        let (assertions, skipped) = self.verify_all(ctx, iteration).await;
        let passed = assertions.iter().filter(|a| a.passed).count() as u32;
        let failed = assertions.len() as u32 - passed;
        let mut record = ShipIteration {
            iteration,
            rebuilt,
            navigation_error,
            assertions,
            passed,
            failed,
            skipped,
            screenshot_path: None,
            duration_ms: 0,
        };
        let done = record.all_passed();
        if !done {
            record.screenshot_path = self.failure_screenshot(ctx, iteration).await;
        }
        record.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(iteration, passed, failed, skipped, "iteration verified");
        self.state.iterations.push(record);

        if done {
            Ok(IterationOutcome::Stop(TerminationReason::AssertionsPassed))
        } else {
            Ok(IterationOutcome::Continue)
        }
    }

    fn budget_exhausted(
        &self,
        _ctx: &RunContext,
        iterations_run: u32,
    ) -> Option<TerminationReason> {
        (iterations_run >= self.options.max_iterations).then_some(TerminationReason::MaxIterations)
    }

    fn iteration_delay(&self, _completed: u32) -> Duration {
        Duration::from_millis(self.options.timing.iteration_delay_ms)
    }

    async fn finish(
        &mut self,
        ctx: &mut RunContext,
        reason: TerminationReason,
        error: Option<String>,
    ) -> FeatureShipResult {
        let iterations = std::mem::take(&mut self.state.iterations);
        FeatureShipResult {
            completed: reason.is_completion(),
            termination_reason: reason,
            simulator: Some(ctx.simulator.name.clone()),
            bundle_id: Some(self.state.bundle_id.clone()),
            max_iterations: self.options.max_iterations,
            iterations_run: iterations.len() as u32,
            iterations,
            builds: self.state.builds,
            elapsed_ms: ctx.elapsed_ms(),
            artifacts_dir: Some(ctx.run_dir.clone()),
            error,
        }
    }

    fn render_html(&self, output: &FeatureShipResult) -> String {
        report::render_html(output)
    }
}

/// Run a feature ship loop, checking assertions against the live UI tree.
///
/// # Errors
///
/// Returns `Err` only when the options are invalid.
pub async fn run_feature_ship_loop(
    toolchain: &Toolchain,
    options: FeatureShipOptions,
) -> SimhuntResult<PlaybookOutcome<FeatureShipResult>> {
    let verifier = Arc::new(UiTreeVerifier::new(toolchain.inspector.clone()));
    run_feature_ship_loop_with_verifier(toolchain, options, verifier).await
}

/// Run a feature ship loop with a caller-supplied verifier.
///
/// # Errors
///
/// Returns `Err` only when the options are invalid.
pub async fn run_feature_ship_loop_with_verifier(
    toolchain: &Toolchain,
    options: FeatureShipOptions,
    verifier: Arc<dyn AssertionVerifier>,
) -> SimhuntResult<PlaybookOutcome<FeatureShipResult>> {
    PlaybookRunner::new(toolchain.clone())
        .run(FeatureShip::new(options, verifier))
        .await
}
