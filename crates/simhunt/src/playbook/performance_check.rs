//! Performance Check: launch timing, flow sampling, baseline comparison.
//!
//! Iterations `1..=runs` each time one cold/warm launch pair. The final
//! iteration measures every configured flow (or a single idle flow), folds
//! everything into a [`MetricSummary`], and compares it against the
//! baseline file when one is given.

use super::controller::{
    IterationOutcome, Phase, PlaybookOutcome, PlaybookRunner, PlaybookStrategy, RunContext,
    RunOptions, StartFailure, TerminationReason,
};
use super::setup::{provision, AppSource};
use crate::driver::Toolchain;
use crate::navigation::{Flow, Navigator};
use crate::performance::{
    detect_regressions, measure_flow, measure_launch_run, summarize, FlowMeasurement, LaunchRun,
    MetricStats, MetricSummary, MetricsSampler, PerformanceBaseline, PerformanceRegression,
    SamplingPlan, SimulatedSampler,
};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::report::performance as report;
use crate::result::{SimhuntError, SimhuntResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Most launch runs accepted
pub const MAX_RUNS: u32 = 100;

/// Sleeps used by the check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceTiming {
    /// Wait after each terminate, before the timed launch
    pub settle_ms: u64,
    /// Wait between launch runs
    pub run_delay_ms: u64,
    /// Wait between resource samples
    pub sample_interval_ms: u64,
}

impl Default for PerformanceTiming {
    fn default() -> Self {
        Self {
            settle_ms: 1_000,
            run_delay_ms: 2_000,
            sample_interval_ms: 500,
        }
    }
}

impl PerformanceTiming {
    /// No waiting at all
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            settle_ms: 0,
            run_delay_ms: 0,
            sample_interval_ms: 0,
        }
    }
}

/// Performance Check options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceCheckOptions {
    /// App under test
    #[serde(flatten)]
    pub source: AppSource,
    /// Shared run options
    #[serde(flatten)]
    pub run: RunOptions,
    /// Cold/warm launch pairs, 1..=100
    pub runs: u32,
    /// Flows to sample; empty means one idle flow
    pub flows: Vec<Flow>,
    /// Baseline to compare against
    pub baseline_path: Option<PathBuf>,
    /// Write this run's metrics to `baseline_path` at the end
    pub save_baseline: bool,
    /// Regression threshold in percent
    pub threshold_percent: f64,
    /// Samples taken per flow
    pub samples_per_flow: u32,
    /// Seed for the simulated sampler
    pub sampler_seed: Option<u64>,
    /// Sleeps
    pub timing: PerformanceTiming,
}

impl Default for PerformanceCheckOptions {
    fn default() -> Self {
        Self {
            source: AppSource::default(),
            run: RunOptions::default(),
            runs: 5,
            flows: Vec::new(),
            baseline_path: None,
            save_baseline: false,
            threshold_percent: 10.0,
            samples_per_flow: 10,
            sampler_seed: None,
            timing: PerformanceTiming::default(),
        }
    }
}

impl PerformanceCheckOptions {
    /// Measure an installed app
    #[must_use]
    pub fn for_bundle(bundle_id: impl Into<String>) -> Self {
        Self {
            source: AppSource::installed(bundle_id),
            ..Self::default()
        }
    }

    /// Set the app source
    #[must_use]
    pub fn with_source(mut self, source: AppSource) -> Self {
        self.source = source;
        self
    }

    /// Set the number of launch runs
    #[must_use]
    pub const fn with_runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    /// Add a flow
    #[must_use]
    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    /// Compare against this baseline file
    #[must_use]
    pub fn with_baseline(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline_path = Some(path.into());
        self
    }

    /// Write a fresh baseline at the end
    #[must_use]
    pub const fn with_save_baseline(mut self, save: bool) -> Self {
        self.save_baseline = save;
        self
    }

    /// Set the regression threshold
    #[must_use]
    pub const fn with_threshold_percent(mut self, threshold: f64) -> Self {
        self.threshold_percent = threshold;
        self
    }

    /// Set the per-flow sample count
    #[must_use]
    pub const fn with_samples_per_flow(mut self, samples: u32) -> Self {
        self.samples_per_flow = samples;
        self
    }

    /// Set the sleeps
    #[must_use]
    pub const fn with_timing(mut self, timing: PerformanceTiming) -> Self {
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
        if self.source.bundle_id.is_none() && !self.source.is_buildable() {
            return Err(SimhuntError::validation(
                "bundle_id or project_path + scheme is required",
            ));
        }
        if !(1..=MAX_RUNS).contains(&self.runs) {
            return Err(SimhuntError::validation(format!(
                "runs must be between 1 and {MAX_RUNS}, got {}",
                self.runs
            )));
        }
        if !(self.threshold_percent.is_finite() && self.threshold_percent > 0.0) {
            return Err(SimhuntError::validation(format!(
                "threshold_percent must be positive, got {}",
                self.threshold_percent
            )));
        }
        if self.samples_per_flow == 0 {
            return Err(SimhuntError::validation("samples_per_flow must be at least 1"));
        }
        if self.save_baseline && self.baseline_path.is_none() {
            return Err(SimhuntError::validation("save_baseline requires baseline_path"));
        }
        if self.flows.iter().any(|f| f.name.trim().is_empty()) {
            return Err(SimhuntError::validation("flow names must not be empty"));
        }
        Ok(())
    }
}

/// Performance Check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCheckResult {
    /// The check ran to a natural end
    pub completed: bool,
    /// Why it stopped
    pub termination_reason: TerminationReason,
    /// Simulator name
    pub simulator: Option<String>,
    /// App
    pub bundle_id: Option<String>,
    /// Configured launch runs
    pub runs: u32,
    /// Per-run launch timings, failures included
    pub launch_runs: Vec<LaunchRun>,
    /// Cold launch statistics over successful runs
    pub cold_launch: MetricStats,
    /// Warm launch statistics over successful runs
    pub warm_launch: MetricStats,
    /// Per-flow resource summaries
    pub flows: Vec<FlowMeasurement>,
    /// The compared metric set
    pub metrics: MetricSummary,
    /// Sampler that produced the flow readings
    pub sampler: String,
    /// Baseline file used
    pub baseline_path: Option<PathBuf>,
    /// Baseline that was compared against
    pub baseline: Option<PerformanceBaseline>,
    /// Why the baseline could not be used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_error: Option<String>,
    /// Whether a fresh baseline was written
    pub baseline_saved: bool,
    /// Threshold used
    pub threshold_percent: f64,
    /// Always equals `regressions.len()`
    pub regressions_found: u32,
    /// Regressed metrics
    pub regressions: Vec<PerformanceRegression>,
    /// Actual run time
    pub elapsed_ms: u64,
    /// Run directory
    pub artifacts_dir: Option<PathBuf>,
    /// Error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PerformanceCheckResult {
    fn empty(reason: TerminationReason, options: &PerformanceCheckOptions, sampler: &str) -> Self {
        Self {
            completed: false,
            termination_reason: reason,
            simulator: None,
            bundle_id: options.source.bundle_id.clone(),
            runs: options.runs,
            launch_runs: Vec::new(),
            cold_launch: MetricStats::default(),
            warm_launch: MetricStats::default(),
            flows: Vec::new(),
            metrics: MetricSummary::default(),
            sampler: sampler.to_string(),
            baseline_path: options.baseline_path.clone(),
            baseline: None,
            baseline_error: None,
            baseline_saved: false,
            threshold_percent: options.threshold_percent,
            regressions_found: 0,
            regressions: Vec::new(),
            elapsed_ms: 0,
            artifacts_dir: None,
            error: None,
        }
    }
}

#[derive(Debug, Default)]
struct MeasureState {
    bundle_id: Option<String>,
    launch_runs: Vec<LaunchRun>,
    flows: Vec<FlowMeasurement>,
    metrics: MetricSummary,
    baseline: Option<PerformanceBaseline>,
    baseline_error: Option<String>,
    baseline_saved: bool,
    regressions: Vec<PerformanceRegression>,
}

/// Performance Check strategy
pub struct PerformanceCheck {
    options: PerformanceCheckOptions,
    sampler: Arc<dyn MetricsSampler>,
    state: MeasureState,
}

impl std::fmt::Debug for PerformanceCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceCheck")
            .field("options", &self.options)
            .field("sampler", &self.sampler.name())
            .finish_non_exhaustive()
    }
}

impl PerformanceCheck {
    /// Create a check using `sampler` for flow readings
    #[must_use]
    pub fn new(options: PerformanceCheckOptions, sampler: Arc<dyn MetricsSampler>) -> Self {
        let state = MeasureState {
            bundle_id: options.source.bundle_id.clone(),
            ..MeasureState::default()
        };
        Self {
            options,
            sampler,
            state,
        }
    }

    async fn measure_flows(&mut self, ctx: &RunContext, bundle_id: &str) {
        let idle = [Flow::idle()];
        let flows: &[Flow] = if self.options.flows.is_empty() {
            &idle
        } else {
            &self.options.flows
        };
        let plan = SamplingPlan {
            samples: self.options.samples_per_flow,
            interval: Duration::from_millis(self.options.timing.sample_interval_ms),
        };
        let navigator = Navigator::new(
            ctx.toolchain.device.as_ref(),
            ctx.toolchain.inspector.as_ref(),
            ctx.udid(),
            bundle_id,
        );
        for flow in flows {
            ctx.phase(Phase::Measuring, format!("sampling flow '{}'", flow.name));
            let measurement = measure_flow(
                &navigator,
                self.sampler.as_ref(),
                ctx.udid(),
                bundle_id,
                flow,
                plan,
            )
            .await;
            ctx.emit(ProgressEvent::FlowMeasured(measurement.clone()));
            self.state.flows.push(measurement);
        }
    }

    fn compare_to_baseline(&mut self, ctx: &RunContext) {
        let Some(path) = &self.options.baseline_path else {
            return;
        };
        if !path.exists() {
            if !self.options.save_baseline {
                self.state.baseline_error =
                    Some(format!("baseline file {} does not exist", path.display()));
            }
            tracing::info!(path = %path.display(), "no baseline yet, nothing to compare");
            return;
        }
        match PerformanceBaseline::load(path) {
            Ok(baseline) => {
                self.state.regressions = detect_regressions(
                    &self.state.metrics,
                    &baseline.metrics,
                    self.options.threshold_percent,
                );
                for regression in &self.state.regressions {
                    tracing::warn!(
                        metric = %regression.metric,
                        change_percent = regression.change_percent,
                        severity = %regression.severity,
                        "performance regression"
                    );
                    ctx.emit(ProgressEvent::Regression(regression.clone()));
                }
                self.state.baseline = Some(baseline);
            }
            Err(e) => {
                tracing::warn!(error = %e, "baseline unusable, skipping comparison");
                self.state.baseline_error = Some(e.to_string());
            }
        }
    }

    fn save_baseline(&mut self, ctx: &RunContext, bundle_id: &str) {
        let (true, Some(path)) = (self.options.save_baseline, &self.options.baseline_path) else {
            return;
        };
        let fresh = PerformanceBaseline::from_metrics(
            self.state.metrics,
            ctx.simulator.name.clone(),
            bundle_id,
        );
        match fresh.save(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "baseline saved");
                self.state.baseline_saved = true;
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "baseline save failed"),
        }
    }
}

#[async_trait]
impl PlaybookStrategy for PerformanceCheck {
    type Output = PerformanceCheckResult;

    fn name(&self) -> &'static str {
        "performance_check"
    }

    fn report_name(&self) -> &'static str {
        "performance_report"
    }

    fn run_options(&self) -> &RunOptions {
        &self.options.run
    }

    fn validate(&self) -> SimhuntResult<()> {
        self.options.validate()
    }

    fn dry_run(&self) -> PerformanceCheckResult {
        PerformanceCheckResult::empty(TerminationReason::DryRun, &self.options, self.sampler.name())
    }

    fn failed_before_start(&self, failure: StartFailure) -> PerformanceCheckResult {
        let mut result =
            PerformanceCheckResult::empty(failure.reason, &self.options, self.sampler.name());
        result.simulator = failure.simulator;
        result.elapsed_ms = failure.elapsed_ms;
        result.artifacts_dir = failure.artifacts_dir;
        result.error = Some(failure.error);
        result
    }

    async fn prepare(&mut self, ctx: &mut RunContext) -> SimhuntResult<()> {
        let bundle_id = provision(ctx, &self.options.source).await?;
        self.state.bundle_id = Some(bundle_id);
        ctx.phase(
            Phase::Measuring,
            format!("timing {} launch runs", self.options.runs),
        );
        Ok(())
    }

    async fn run_iteration(
        &mut self,
        ctx: &mut RunContext,
        iteration: u32,
    ) -> SimhuntResult<IterationOutcome> {
        let bundle_id = self
            .state
            .bundle_id
            .clone()
            .ok_or_else(|| SimhuntError::validation("no bundle id resolved"))?;

        if iteration <= self.options.runs {
            let run = measure_launch_run(
                ctx.toolchain.device.as_ref(),
                ctx.udid(),
                &bundle_id,
                iteration,
                Duration::from_millis(self.options.timing.settle_ms),
            )
            .await;
            if let Some(error) = &run.error {
                tracing::warn!(run = iteration, %error, "launch run failed");
            }
            ctx.emit(ProgressEvent::LaunchMeasured {
                run: run.run,
                cold_ms: run.cold_ms,
                warm_ms: run.warm_ms,
            });
            self.state.launch_runs.push(run);
            return Ok(IterationOutcome::Continue);
        }

        self.measure_flows(ctx, &bundle_id).await;
        self.state.metrics = summarize(&self.state.launch_runs, &self.state.flows);
        self.compare_to_baseline(ctx);
        self.save_baseline(ctx, &bundle_id);

        let reason = if self.state.regressions.is_empty() {
            TerminationReason::WithinThreshold
        } else {
            TerminationReason::RegressionsFound
        };
        Ok(IterationOutcome::Stop(reason))
    }

    fn budget_exhausted(
        &self,
        _ctx: &RunContext,
        _iterations_run: u32,
    ) -> Option<TerminationReason> {
        // the flow iteration always stops the run itself
        None
    }

    fn iteration_delay(&self, completed: u32) -> Duration {
        // the pause separates launch runs; the flow iteration follows without one
        if completed < self.options.runs {
            Duration::from_millis(self.options.timing.run_delay_ms)
        } else {
            Duration::ZERO
        }
    }

    async fn finish(
        &mut self,
        ctx: &mut RunContext,
        reason: TerminationReason,
        error: Option<String>,
    ) -> PerformanceCheckResult {
        let cold: Vec<f64> = self.state.launch_runs.iter().filter_map(|r| r.cold_ms).collect();
        let warm: Vec<f64> = self.state.launch_runs.iter().filter_map(|r| r.warm_ms).collect();
        let regressions = std::mem::take(&mut self.state.regressions);
        PerformanceCheckResult {
            completed: reason.is_completion(),
            termination_reason: reason,
            simulator: Some(ctx.simulator.name.clone()),
            bundle_id: self.state.bundle_id.clone(),
            runs: self.options.runs,
            launch_runs: std::mem::take(&mut self.state.launch_runs),
            cold_launch: MetricStats::from_values(&cold),
            warm_launch: MetricStats::from_values(&warm),
            flows: std::mem::take(&mut self.state.flows),
            metrics: self.state.metrics,
            sampler: self.sampler.name().to_string(),
            baseline_path: self.options.baseline_path.clone(),
            baseline: self.state.baseline.take(),
            baseline_error: self.state.baseline_error.take(),
            baseline_saved: self.state.baseline_saved,
            threshold_percent: self.options.threshold_percent,
            regressions_found: regressions.len() as u32,
            regressions,
            elapsed_ms: ctx.elapsed_ms(),
            artifacts_dir: Some(ctx.run_dir.clone()),
            error,
        }
    }

    fn render_html(&self, output: &PerformanceCheckResult) -> String {
        report::render_html(output)
    }
}

/// Run a performance check with the seeded [`SimulatedSampler`].
///
/// # Errors
///
/// Returns `Err` only when the options are invalid.
pub async fn run_performance_check(
    toolchain: &Toolchain,
    options: PerformanceCheckOptions,
) -> SimhuntResult<PlaybookOutcome<PerformanceCheckResult>> {
    let sampler = Arc::new(SimulatedSampler::new(options.sampler_seed));
    run_performance_check_with_sampler(toolchain, options, sampler).await
}

/// Run a performance check with a caller-supplied sampler.
///
/// # Errors
///
/// Returns `Err` only when the options are invalid.
pub async fn run_performance_check_with_sampler(
    toolchain: &Toolchain,
    options: PerformanceCheckOptions,
    sampler: Arc<dyn MetricsSampler>,
) -> SimhuntResult<PlaybookOutcome<PerformanceCheckResult>> {
    PlaybookRunner::new(toolchain.clone())
        .run(PerformanceCheck::new(options, sampler))
        .await
}
