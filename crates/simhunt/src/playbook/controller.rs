//! The run template shared by every playbook.
//!
//! [`PlaybookRunner::run`] owns the phase sequence, device resolution, the
//! iteration loop, termination bookkeeping, and report writing. A playbook
//! only supplies a [`PlaybookStrategy`]: its validation, its setup, one
//! iteration body, and its budget predicate.
//!
//! ```text
//! Initializing -> ResolvingDevice -> Building -> Installing
//!     -> [loop: Launching/Hunting/Measuring/Verifying -> CapturingEvidence]
//!     -> GeneratingReport -> Complete | Failed
//! ```

use crate::artifacts::create_run_dir;
use crate::driver::{DeviceControl, Simulator, Toolchain};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::report::write_reports;
use crate::result::{SimhuntError, SimhuntResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Options accepted, nothing touched yet
    Initializing,
    /// Picking and booting a simulator
    ResolvingDevice,
    /// Compiling the app
    Building,
    /// Installing the app
    Installing,
    /// Launching the app
    Launching,
    /// Performing random actions
    Hunting,
    /// Timing launches or sampling flows
    Measuring,
    /// Checking assertions
    Verifying,
    /// Saving a crash evidence bundle
    CapturingEvidence,
    /// Writing report files
    GeneratingReport,
    /// Finished normally
    Complete,
    /// Finished with an error
    Failed,
}

impl Phase {
    /// Snake-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::ResolvingDevice => "resolving_device",
            Self::Building => "building",
            Self::Installing => "installing",
            Self::Launching => "launching",
            Self::Hunting => "hunting",
            Self::Measuring => "measuring",
            Self::Verifying => "verifying",
            Self::CapturingEvidence => "capturing_evidence",
            Self::GeneratingReport => "generating_report",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped; exactly one per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Every assertion held
    AssertionsPassed,
    /// Every metric stayed within the regression threshold
    WithinThreshold,
    /// At least one metric regressed
    RegressionsFound,
    /// Iteration budget used up
    MaxIterations,
    /// Time budget used up
    DurationElapsed,
    /// Crash budget used up
    CrashLimit,
    /// A build failed
    BuildFailed,
    /// A crash was found and recovery is disabled
    CrashNoReset,
    /// The app could not be relaunched after a crash or depth reset
    RelaunchFailed,
    /// Unexpected failure inside a step
    Error,
    /// Validation only
    DryRun,
}

impl TerminationReason {
    /// Snake-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AssertionsPassed => "assertions_passed",
            Self::WithinThreshold => "within_threshold",
            Self::RegressionsFound => "regressions_found",
            Self::MaxIterations => "max_iterations",
            Self::DurationElapsed => "duration_elapsed",
            Self::CrashLimit => "crash_limit",
            Self::BuildFailed => "build_failed",
            Self::CrashNoReset => "crash_no_reset",
            Self::RelaunchFailed => "relaunch_failed",
            Self::Error => "error",
            Self::DryRun => "dry_run",
        }
    }

    /// The run reached its natural end (success or budget)
    #[must_use]
    pub const fn is_completion(self) -> bool {
        matches!(
            self,
            Self::AssertionsPassed
                | Self::WithinThreshold
                | Self::RegressionsFound
                | Self::MaxIterations
                | Self::DurationElapsed
                | Self::CrashLimit
        )
    }

    /// The run stopped on a fatal condition
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::BuildFailed | Self::CrashNoReset | Self::RelaunchFailed | Self::Error
        )
    }

    fn for_setup_error(error: &SimhuntError) -> Self {
        match error {
            SimhuntError::Build { .. } => Self::BuildFailed,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outer envelope returned by every `run_*` entry point.
///
/// `success = false` means the run never got a device/app context (device
/// resolution, initial build, install, or launch failed). Failures after
/// that point keep `success = true` and surface through the result's own
/// `completed` and `error` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookOutcome<R> {
    /// Whether the run got started
    pub success: bool,
    /// Why it could not start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Playbook result
    pub result: R,
}

/// Options every playbook shares
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Simulator name or UDID; `None` picks one
    pub simulator: Option<String>,
    /// Root under which a per-run directory is created
    pub artifacts_dir: PathBuf,
    /// Validate only
    pub dry_run: bool,
    /// Event sink
    #[serde(skip)]
    pub progress: ProgressSender,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            simulator: None,
            artifacts_dir: PathBuf::from("simhunt-artifacts"),
            dry_run: false,
            progress: ProgressSender::default(),
        }
    }
}

/// What was known when a run failed before it started
#[derive(Debug, Clone)]
pub struct StartFailure {
    /// `build_failed` or `error`
    pub reason: TerminationReason,
    /// Error text
    pub error: String,
    /// Simulator name, if one was resolved
    pub simulator: Option<String>,
    /// Run directory, if one was created
    pub artifacts_dir: Option<PathBuf>,
    /// Time spent
    pub elapsed_ms: u64,
}

/// Per-run state shared with the strategy
pub struct RunContext {
    playbook: &'static str,
    /// Collaborators
    pub toolchain: Toolchain,
    /// Resolved simulator
    pub simulator: Simulator,
    /// This run's artifact directory
    pub run_dir: PathBuf,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    progress: ProgressSender,
    started: Instant,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("playbook", &self.playbook)
            .field("simulator", &self.simulator.name)
            .field("run_dir", &self.run_dir)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Simulator UDID
    #[must_use]
    pub fn udid(&self) -> &str {
        &self.simulator.udid
    }

    /// Time since the run started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Milliseconds since the run started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Publish an event
    pub fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event);
    }

    /// Enter a phase and publish it
    pub fn phase(&self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(playbook = self.playbook, %phase, "{message}");
        self.emit(ProgressEvent::PhaseChanged {
            playbook: self.playbook.to_string(),
            phase,
            message,
        });
    }
}

/// Result of one iteration body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Keep going unless the budget is used up
    Continue,
    /// Stop with this reason
    Stop(TerminationReason),
    /// Stop with this reason and an error message
    Fail {
        /// Reason
        reason: TerminationReason,
        /// Error message
        error: String,
    },
}

/// The parts of a playbook that differ between playbooks
#[async_trait]
pub trait PlaybookStrategy: Send {
    /// Final result type
    type Output: Serialize + Send + Sync;

    /// Playbook name, e.g. `crash_hunt`
    fn name(&self) -> &'static str;

    /// Report file stem, e.g. `crash_hunt_report`
    fn report_name(&self) -> &'static str;

    /// Shared options
    fn run_options(&self) -> &RunOptions;

    /// Check options; runs before anything else, dry run included
    fn validate(&self) -> SimhuntResult<()>;

    /// Zero-activity result for a dry run
    fn dry_run(&self) -> Self::Output;

    /// Result for a run that never got a device/app context
    fn failed_before_start(&self, failure: StartFailure) -> Self::Output;

    /// Build, install, and launch as needed
    async fn prepare(&mut self, ctx: &mut RunContext) -> SimhuntResult<()>;

    /// One iteration; `Err` stops the run with reason `error`
    async fn run_iteration(
        &mut self,
        ctx: &mut RunContext,
        iteration: u32,
    ) -> SimhuntResult<IterationOutcome>;

    /// Checked after an iteration that asked to continue
    fn budget_exhausted(&self, ctx: &RunContext, iterations_run: u32) -> Option<TerminationReason>;

    /// Pause after iteration `completed` before the next one starts
    fn iteration_delay(&self, _completed: u32) -> Duration {
        Duration::ZERO
    }

    /// Assemble the final result
    async fn finish(
        &mut self,
        ctx: &mut RunContext,
        reason: TerminationReason,
        error: Option<String>,
    ) -> Self::Output;

    /// HTML dashboard for the report file
    fn render_html(&self, output: &Self::Output) -> String;
}

/// Pick a simulator.
///
/// An explicit name or UDID wins (booted on demand). Otherwise the first
/// booted device, otherwise the first available iPhone (booted on demand).
pub async fn resolve_simulator(
    device: &dyn DeviceControl,
    requested: Option<&str>,
) -> SimhuntResult<Simulator> {
    if let Some(wanted) = requested {
        let devices = device.list_devices().await?;
        let found = devices
            .into_iter()
            .find(|d| d.udid == wanted || d.name == wanted)
            .ok_or_else(|| SimhuntError::DeviceNotFound {
                message: format!("no simulator named or identified by '{wanted}'"),
            })?;
        return ensure_booted(device, found).await;
    }

    if let Some(booted) = device.booted_devices().await?.into_iter().next() {
        return Ok(booted);
    }

    let candidate = device
        .list_devices()
        .await?
        .into_iter()
        .find(|d| d.is_available && d.is_iphone())
        .ok_or_else(|| SimhuntError::DeviceNotFound {
            message: "no booted simulator and no available iPhone simulator".to_string(),
        })?;
    ensure_booted(device, candidate).await
}

async fn ensure_booted(device: &dyn DeviceControl, mut sim: Simulator) -> SimhuntResult<Simulator> {
    if !sim.is_booted() {
        tracing::info!(name = %sim.name, udid = %sim.udid, "booting simulator");
        device.boot_device(&sim.udid).await?;
        sim.state = crate::driver::SimulatorState::Booted;
    }
    Ok(sim)
}

/// Drives a [`PlaybookStrategy`] through the shared phase sequence
#[derive(Debug, Clone)]
pub struct PlaybookRunner {
    toolchain: Toolchain,
}

impl PlaybookRunner {
    /// Create a runner over a set of collaborators
    #[must_use]
    pub const fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    /// Run a playbook to completion.
    ///
    /// # Errors
    ///
    /// Only validation failures are returned as `Err`; every other failure
    /// is reported through the outcome.
    pub async fn run<S: PlaybookStrategy>(
        &self,
        mut strategy: S,
    ) -> SimhuntResult<PlaybookOutcome<S::Output>> {
        strategy.validate()?;

        let options = strategy.run_options().clone();
        let playbook = strategy.name();
        if options.dry_run {
            tracing::info!(playbook, "dry run: options valid");
            options.progress.emit(ProgressEvent::Finished {
                termination_reason: TerminationReason::DryRun,
            });
            return Ok(PlaybookOutcome {
                success: true,
                error: None,
                result: strategy.dry_run(),
            });
        }

        let started = Instant::now();
        let started_at = Utc::now();
        let announce = |phase: Phase, message: &str| {
            tracing::info!(playbook, %phase, "{message}");
            options.progress.emit(ProgressEvent::PhaseChanged {
                playbook: playbook.to_string(),
                phase,
                message: message.to_string(),
            });
        };
        announce(Phase::Initializing, "starting");
        announce(Phase::ResolvingDevice, "resolving simulator");

        let simulator =
            match resolve_simulator(self.toolchain.device.as_ref(), options.simulator.as_deref())
                .await
            {
                Ok(sim) => sim,
                Err(e) => {
                    return Ok(Self::abort(
                        &strategy,
                        &options.progress,
                        None,
                        &e,
                        started,
                    )
                    .await)
                }
            };

        let run_dir = match create_run_dir(&options.artifacts_dir, playbook).await {
            Ok(dir) => dir,
            Err(e) => {
                return Ok(Self::abort(
                    &strategy,
                    &options.progress,
                    Some((&simulator, None)),
                    &e,
                    started,
                )
                .await)
            }
        };

        let mut ctx = RunContext {
            playbook,
            toolchain: self.toolchain.clone(),
            simulator,
            run_dir,
            started_at,
            progress: options.progress.clone(),
            started,
        };
        tracing::info!(
            playbook,
            simulator = %ctx.simulator.name,
            run_dir = %ctx.run_dir.display(),
            "run started"
        );

        if let Err(e) = strategy.prepare(&mut ctx).await {
            let run_dir = ctx.run_dir.clone();
            return Ok(Self::abort(
                &strategy,
                &options.progress,
                Some((&ctx.simulator, Some(run_dir.as_path()))),
                &e,
                started,
            )
            .await);
        }

        let mut iteration = 0u32;
        let (reason, error) = loop {
            iteration += 1;
            ctx.emit(ProgressEvent::IterationStarted { iteration });
            match strategy.run_iteration(&mut ctx, iteration).await {
                Ok(IterationOutcome::Continue) => {}
                Ok(IterationOutcome::Stop(reason)) => break (reason, None),
                Ok(IterationOutcome::Fail { reason, error }) => break (reason, Some(error)),
                Err(e) => {
                    tracing::warn!(playbook, iteration, error = %e, "iteration failed");
                    break (TerminationReason::Error, Some(e.to_string()));
                }
            }
            if let Some(reason) = strategy.budget_exhausted(&ctx, iteration) {
                break (reason, None);
            }
            let delay = strategy.iteration_delay(iteration);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        };

        tracing::info!(playbook, %reason, iterations = iteration, "loop finished");
        ctx.phase(Phase::GeneratingReport, "writing reports");
        let output = strategy.finish(&mut ctx, reason, error).await;
        let html = strategy.render_html(&output);
        write_reports(&ctx.run_dir, strategy.report_name(), &output, &html).await;

        let last = if reason.is_failure() {
            Phase::Failed
        } else {
            Phase::Complete
        };
        ctx.phase(last, reason.as_str());
        ctx.emit(ProgressEvent::Finished {
            termination_reason: reason,
        });
        Ok(PlaybookOutcome {
            success: true,
            error: None,
            result: output,
        })
    }

    async fn abort<S: PlaybookStrategy>(
        strategy: &S,
        progress: &ProgressSender,
        context: Option<(&Simulator, Option<&Path>)>,
        error: &SimhuntError,
        started: Instant,
    ) -> PlaybookOutcome<S::Output> {
        let reason = TerminationReason::for_setup_error(error);
        tracing::warn!(playbook = strategy.name(), %reason, error = %error, "run could not start");
        let run_dir = context.and_then(|(_, dir)| dir.map(Path::to_path_buf));
        let output = strategy.failed_before_start(StartFailure {
            reason,
            error: error.to_string(),
            simulator: context.map(|(sim, _)| sim.name.clone()),
            artifacts_dir: run_dir.clone(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
        if let Some(dir) = &run_dir {
            let html = strategy.render_html(&output);
            write_reports(dir, strategy.report_name(), &output, &html).await;
        }
        progress.emit(ProgressEvent::PhaseChanged {
            playbook: strategy.name().to_string(),
            phase: Phase::Failed,
            message: error.to_string(),
        });
        progress.emit(ProgressEvent::Finished {
            termination_reason: reason,
        });
        PlaybookOutcome {
            success: false,
            error: Some(error.to_string()),
            result: output,
        }
    }
}
