//! Crash Hunt: seeded random UI exploration that stops on, or recovers
//! from, crashes.
//!
//! Each loop iteration performs one action. After every action the crash
//! detector is consulted; a crash produces an evidence bundle under
//! `crashes/crash-<n>/` and then either ends the run (`reset_on_crash =
//! false`) or relaunches the app and keeps hunting.

use super::controller::{
    IterationOutcome, Phase, PlaybookOutcome, PlaybookRunner, PlaybookStrategy, RunContext,
    RunOptions, StartFailure, TerminationReason,
};
use super::setup::{provision, relaunch_with_retry, AppSource};
use crate::action::{ActionConfig, ActionExecutor, ActionWeights, RecordedAction};
use crate::crash::{
    capture_evidence, CrashDetection, CrashDetector, EvidenceRequest, LOG_EXCERPT_LINES,
};
use crate::driver::Toolchain;
use crate::progress::{ProgressEvent, ProgressSender, ProgressSnapshot};
use crate::report::crash_hunt as report;
use crate::result::{SimhuntError, SimhuntResult};
use crate::rng::SeededRng;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest hunt accepted, in seconds
pub const MAX_DURATION_SECS: u64 = 86_400;

/// Sleeps used by the hunt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashHuntTiming {
    /// Wait after every launch
    pub launch_settle_ms: u64,
    /// Wait after every action
    pub action_delay_ms: u64,
    /// Wait between relaunch attempts
    pub relaunch_backoff_ms: u64,
}

impl Default for CrashHuntTiming {
    fn default() -> Self {
        Self {
            launch_settle_ms: 2_000,
            action_delay_ms: 500,
            relaunch_backoff_ms: 1_000,
        }
    }
}

impl CrashHuntTiming {
    /// No waiting at all
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            launch_settle_ms: 0,
            action_delay_ms: 0,
            relaunch_backoff_ms: 0,
        }
    }
}

/// Crash Hunt options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashHuntOptions {
    /// App under test
    #[serde(flatten)]
    pub source: AppSource,
    /// Shared run options
    #[serde(flatten)]
    pub run: RunOptions,
    /// Time budget in seconds, 1..=86400
    pub duration_secs: u64,
    /// RNG seed; `None` derives one from the clock
    pub seed: Option<u64>,
    /// Action weights, screen size, exclusions
    pub actions: ActionConfig,
    /// Relaunch to the root screen at this navigation depth
    pub max_depth: u32,
    /// Relaunch and continue after a crash
    pub reset_on_crash: bool,
    /// Launch attempts per relaunch
    pub relaunch_attempts: u32,
    /// Stop after this many crashes
    pub max_crashes: Option<u32>,
    /// Stop after this many actions
    pub max_actions: Option<u32>,
    /// Sleeps
    pub timing: CrashHuntTiming,
}

impl Default for CrashHuntOptions {
    fn default() -> Self {
        Self {
            source: AppSource::default(),
            run: RunOptions::default(),
            duration_secs: 300,
            seed: None,
            actions: ActionConfig::default(),
            max_depth: 10,
            reset_on_crash: true,
            relaunch_attempts: 3,
            max_crashes: None,
            max_actions: None,
            timing: CrashHuntTiming::default(),
        }
    }
}

impl CrashHuntOptions {
    /// Hunt an installed app
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

    /// Set the time budget
    #[must_use]
    pub const fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Set the seed
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the action weights
    #[must_use]
    pub const fn with_weights(mut self, weights: ActionWeights) -> Self {
        self.actions.weights = weights;
        self
    }

    /// Set the depth limit
    #[must_use]
    pub const fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Enable or disable crash recovery
    #[must_use]
    pub const fn with_reset_on_crash(mut self, reset: bool) -> Self {
        self.reset_on_crash = reset;
        self
    }

    /// Stop after `n` crashes
    #[must_use]
    pub const fn with_max_crashes(mut self, n: u32) -> Self {
        self.max_crashes = Some(n);
        self
    }

    /// Stop after `n` actions
    #[must_use]
    pub const fn with_max_actions(mut self, n: u32) -> Self {
        self.max_actions = Some(n);
        self
    }

    /// Set the sleeps
    #[must_use]
    pub const fn with_timing(mut self, timing: CrashHuntTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Set the artifacts root
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run.artifacts_dir = dir.into();
        self
    }

    /// Pick a simulator by name or UDID
    #[must_use]
    pub fn with_simulator(mut self, simulator: impl Into<String>) -> Self {
        self.run.simulator = Some(simulator.into());
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
        self.source.validate(true)?;
        if !(1..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            return Err(SimhuntError::validation(format!(
                "duration_secs must be between 1 and {MAX_DURATION_SECS}, got {}",
                self.duration_secs
            )));
        }
        self.actions.weights.validate().map_err(SimhuntError::validation)?;
        if self.max_depth == 0 {
            return Err(SimhuntError::validation("max_depth must be at least 1"));
        }
        if self.relaunch_attempts == 0 {
            return Err(SimhuntError::validation("relaunch_attempts must be at least 1"));
        }
        if self.max_crashes == Some(0) {
            return Err(SimhuntError::validation("max_crashes must be at least 1"));
        }
        Ok(())
    }
}

/// Crash Hunt result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashHuntResult {
    /// The hunt ran to a natural end
    pub completed: bool,
    /// Why it stopped
    pub termination_reason: TerminationReason,
    /// Simulator name
    pub simulator: Option<String>,
    /// App
    pub bundle_id: Option<String>,
    /// Seed, for replaying the hunt
    pub seed: u64,
    /// Configured time budget
    pub duration_secs: u64,
    /// Actual run time
    pub elapsed_ms: u64,
    /// Always equals `actions.len()`
    pub actions_performed: u32,
    /// Every recorded action, numbered from 1
    pub actions: Vec<RecordedAction>,
    /// Always equals `crashes.len()`
    pub crashes_found: u32,
    /// Every recorded crash, numbered from 1
    pub crashes: Vec<CrashDetection>,
    /// Deepest navigation depth seen
    pub max_depth_reached: u32,
    /// Relaunches triggered by the depth limit
    pub depth_resets: u32,
    /// Run directory
    pub artifacts_dir: Option<PathBuf>,
    /// Error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CrashHuntResult {
    fn empty(reason: TerminationReason, seed: u64, duration_secs: u64) -> Self {
        Self {
            completed: false,
            termination_reason: reason,
            simulator: None,
            bundle_id: None,
            seed,
            duration_secs,
            elapsed_ms: 0,
            actions_performed: 0,
            actions: Vec::new(),
            crashes_found: 0,
            crashes: Vec::new(),
            max_depth_reached: 0,
            depth_resets: 0,
            artifacts_dir: None,
            error: None,
        }
    }
}

#[derive(Debug)]
struct HuntState {
    rng: SeededRng,
    bundle_id: Option<String>,
    detector: Option<CrashDetector>,
    depth: u32,
    max_depth_reached: u32,
    depth_resets: u32,
    actions: Vec<RecordedAction>,
    crashes: Vec<CrashDetection>,
}

/// Crash Hunt strategy
#[derive(Debug)]
pub struct CrashHunt {
    options: CrashHuntOptions,
    executor: ActionExecutor,
    state: HuntState,
}

impl CrashHunt {
    /// Create a hunt; the seed is fixed here so a dry run can report it
    #[must_use]
    pub fn new(options: CrashHuntOptions) -> Self {
        let executor = ActionExecutor::new(options.actions.clone());
        let state = HuntState {
            rng: SeededRng::new(options.seed),
            bundle_id: options.source.bundle_id.clone(),
            detector: None,
            depth: 0,
            max_depth_reached: 0,
            depth_resets: 0,
            actions: Vec::new(),
            crashes: Vec::new(),
        };
        Self {
            options,
            executor,
            state,
        }
    }

    fn snapshot(&self, ctx: &RunContext, iteration: u32) -> ProgressEvent {
        ProgressEvent::Progress(ProgressSnapshot {
            iteration,
            actions_performed: self.state.actions.len() as u32,
            crashes_found: self.state.crashes.len() as u32,
            elapsed_ms: ctx.elapsed_ms(),
        })
    }

    async fn relaunch(&self, ctx: &RunContext, bundle_id: &str) -> SimhuntResult<()> {
        ctx.phase(Phase::Launching, format!("relaunching {bundle_id}"));
        relaunch_with_retry(
            ctx.toolchain.device.as_ref(),
            ctx.udid(),
            bundle_id,
            self.options.relaunch_attempts,
            Duration::from_millis(self.options.timing.relaunch_backoff_ms),
        )
        .await?;
        sleep_ms(self.options.timing.launch_settle_ms).await;
        ctx.phase(Phase::Hunting, "back at the root screen");
        Ok(())
    }
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl PlaybookStrategy for CrashHunt {
    type Output = CrashHuntResult;

    fn name(&self) -> &'static str {
        "crash_hunt"
    }

    fn report_name(&self) -> &'static str {
        "crash_hunt_report"
    }

    fn run_options(&self) -> &RunOptions {
        &self.options.run
    }

    fn validate(&self) -> SimhuntResult<()> {
        self.options.validate()
    }

    fn dry_run(&self) -> CrashHuntResult {
        let mut result = CrashHuntResult::empty(
            TerminationReason::DryRun,
            self.state.rng.seed(),
            self.options.duration_secs,
        );
        result.bundle_id = self.options.source.bundle_id.clone();
        result
    }

    fn failed_before_start(&self, failure: StartFailure) -> CrashHuntResult {
        let mut result = CrashHuntResult::empty(
            failure.reason,
            self.state.rng.seed(),
            self.options.duration_secs,
        );
        result.simulator = failure.simulator;
        result.bundle_id = self.state.bundle_id.clone();
        result.elapsed_ms = failure.elapsed_ms;
        result.artifacts_dir = failure.artifacts_dir;
        result.error = Some(failure.error);
        result
    }

    async fn prepare(&mut self, ctx: &mut RunContext) -> SimhuntResult<()> {
        let bundle_id = provision(ctx, &self.options.source).await?;
        self.state.bundle_id = Some(bundle_id.clone());

        ctx.phase(Phase::Launching, format!("launching {bundle_id}"));
        ctx.toolchain.device.launch_app(ctx.udid(), &bundle_id).await?;
        sleep_ms(self.options.timing.launch_settle_ms).await;

        let predicate =
            format!("subsystem CONTAINS \"{bundle_id}\" OR process CONTAINS \"{bundle_id}\"");
        let stream = match ctx.toolchain.logs.stream_log(ctx.udid(), &predicate).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(error = %e, "log stream unavailable, relying on crash reports");
                None
            }
        };
        self.state.detector = Some(CrashDetector::new(stream));

        ctx.phase(
            Phase::Hunting,
            format!(
                "hunting for {}s with seed {}",
                self.options.duration_secs,
                self.state.rng.seed()
            ),
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

        if self.state.depth >= self.options.max_depth {
            let from_depth = self.state.depth;
            tracing::debug!(from_depth, "max depth reached");
            if let Err(e) = self.relaunch(ctx, &bundle_id).await {
                return Ok(IterationOutcome::Fail {
                    reason: TerminationReason::RelaunchFailed,
                    error: format!("relaunch after depth reset failed: {e}"),
                });
            }
            self.state.depth = 0;
            self.state.depth_resets += 1;
            ctx.emit(ProgressEvent::DepthReset { from_depth });
        }

        let action_number = self.state.actions.len() as u32 + 1;
        let action = self
            .executor
            .perform(
                ctx.toolchain.device.as_ref(),
                ctx.toolchain.inspector.as_ref(),
                ctx.udid(),
                &bundle_id,
                &mut self.state.rng,
                action_number,
                self.state.depth,
            )
            .await;
        self.state.depth = action.depth_after_action;
        self.state.max_depth_reached = self.state.max_depth_reached.max(self.state.depth);
        ctx.emit(ProgressEvent::Action(action.clone()));
        self.state.actions.push(action);
        sleep_ms(self.options.timing.action_delay_ms).await;

        let Some(detector) = self.state.detector.as_mut() else {
            return Err(SimhuntError::validation("crash detector not started"));
        };
        let Some(crash_type) = detector
            .check(ctx.toolchain.logs.as_ref(), ctx.udid(), &bundle_id)
            .await
        else {
            ctx.emit(self.snapshot(ctx, iteration));
            return Ok(IterationOutcome::Continue);
        };

        ctx.phase(Phase::CapturingEvidence, format!("crash detected: {crash_type}"));
        let log_lines = detector.matcher().recent_lines(LOG_EXCERPT_LINES);
        let crash_number = self.state.crashes.len() as u32 + 1;
        let stop = if self.options.reset_on_crash {
            self.options
                .max_crashes
                .is_some_and(|max| crash_number >= max)
                .then_some(TerminationReason::CrashLimit)
        } else {
            Some(TerminationReason::CrashNoReset)
        };
        let mut detection = capture_evidence(
            &ctx.toolchain,
            EvidenceRequest {
                udid: ctx.udid(),
                bundle_id: &bundle_id,
                run_dir: &ctx.run_dir,
                crash_number,
                crash_type,
                actions: &self.state.actions,
                log_lines,
                recovering: stop.is_none(),
            },
        )
        .await;
        detector.mark_recorded();

        let relaunch_error = if stop.is_none() {
            self.relaunch(ctx, &bundle_id).await.err()
        } else {
            None
        };
        if relaunch_error.is_some() {
            detection.recovered = false;
        }
        tracing::warn!(
            crash_number,
            crash_type = %detection.crash_type,
            recovered = detection.recovered,
            evidence = %detection.evidence_dir.display(),
            "crash recorded"
        );
        ctx.emit(ProgressEvent::Crash(detection.clone()));
        self.state.crashes.push(detection);
        ctx.emit(self.snapshot(ctx, iteration));

        if let Some(reason) = stop {
            return Ok(IterationOutcome::Stop(reason));
        }
        if let Some(e) = relaunch_error {
            return Ok(IterationOutcome::Fail {
                reason: TerminationReason::RelaunchFailed,
                error: format!("relaunch after crash #{crash_number} failed: {e}"),
            });
        }
        self.state.depth = 0;
        if let Some(detector) = self.state.detector.as_mut() {
            detector.reset();
        }
        Ok(IterationOutcome::Continue)
    }

    fn budget_exhausted(
        &self,
        ctx: &RunContext,
        _iterations_run: u32,
    ) -> Option<TerminationReason> {
        if self
            .options
            .max_actions
            .is_some_and(|max| self.state.actions.len() as u32 >= max)
        {
            return Some(TerminationReason::MaxIterations);
        }
        (ctx.elapsed() >= Duration::from_secs(self.options.duration_secs))
            .then_some(TerminationReason::DurationElapsed)
    }

    async fn finish(
        &mut self,
        ctx: &mut RunContext,
        reason: TerminationReason,
        error: Option<String>,
    ) -> CrashHuntResult {
        let actions = std::mem::take(&mut self.state.actions);
        let crashes = std::mem::take(&mut self.state.crashes);
        CrashHuntResult {
            completed: reason.is_completion(),
            termination_reason: reason,
            simulator: Some(ctx.simulator.name.clone()),
            bundle_id: self.state.bundle_id.clone(),
            seed: self.state.rng.seed(),
            duration_secs: self.options.duration_secs,
            elapsed_ms: ctx.elapsed_ms(),
            actions_performed: actions.len() as u32,
            actions,
            crashes_found: crashes.len() as u32,
            crashes,
            max_depth_reached: self.state.max_depth_reached,
            depth_resets: self.state.depth_resets,
            artifacts_dir: Some(ctx.run_dir.clone()),
            error,
        }
    }

    fn render_html(&self, output: &CrashHuntResult) -> String {
        report::render_html(output)
    }
}

/// Run a crash hunt.
///
/// # Errors
///
/// Returns `Err` only when the options are invalid.
pub async fn run_crash_hunt(
    toolchain: &Toolchain,
    options: CrashHuntOptions,
) -> SimhuntResult<PlaybookOutcome<CrashHuntResult>> {
    PlaybookRunner::new(toolchain.clone())
        .run(CrashHunt::new(options))
        .await
}
