//! Simhunt: Playbook Execution Engine for iOS Simulators
//!
//! Simhunt runs multi-step testing workflows ("playbooks") against an iOS
//! simulator through a small set of collaborator traits. Three playbooks are
//! provided:
//!
//! - **Crash Hunt**: seeded random UI exploration with crash evidence capture
//! - **Performance Check**: launch timing, resource sampling, and baseline
//!   regression detection
//! - **Feature Ship Loop**: rebuild, relaunch, and verify until UI assertions
//!   hold
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    SIMHUNT Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Playbook   │    │ Playbook   │    │ Toolchain  │            │
//! │   │ Options    │───►│ Runner     │───►│ (simctl,   │            │
//! │   │ (YAML)     │    │ + Strategy │    │  xcodebuild)│           │
//! │   └────────────┘    └─────┬──────┘    └────────────┘            │
//! │                           │                                      │
//! │                 progress events, reports                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Random UI interaction for crash hunting
pub mod action;

/// Per-run artifact directories
pub mod artifacts;

/// Crash detection and evidence capture
pub mod crash;

/// Collaborator traits and the data they exchange
#[allow(clippy::missing_errors_doc)]
pub mod driver;

/// In-memory simulator for tests and dry hosts
#[allow(clippy::missing_panics_doc)]
pub mod mock;

/// Scripted navigation steps
pub mod navigation;

/// Launch timing, resource sampling, and baselines
#[allow(clippy::cast_precision_loss)]
pub mod performance;

/// Playbook template and the three playbooks
#[allow(clippy::missing_errors_doc, clippy::too_many_lines)]
pub mod playbook;

/// Progress events
pub mod progress;

/// Markdown, JSON, compact, and HTML views of results
#[allow(clippy::format_push_string, clippy::cast_precision_loss)]
pub mod report;

mod result;

/// Seeded random source
pub mod rng;

/// UI assertions
pub mod verify;

pub use action::{ActionConfig, ActionKind, ActionWeights, RecordedAction, ScreenSize};
pub use crash::{CrashDetection, CrashPatternMatcher};
pub use driver::{
    BuildDriver, DeviceControl, LogSource, ScreenCapture, Simulator, SimulatorState, Toolchain,
    UiElement, UiInspector,
};
pub use mock::MockSimulator;
pub use navigation::{Flow, NavigationStep};
pub use performance::{
    MetricStats, MetricSummary, MetricsSampler, PerformanceBaseline, PerformanceRegression,
    Severity, SimulatedSampler,
};
pub use playbook::{
    run_crash_hunt, run_feature_ship_loop, run_feature_ship_loop_with_verifier,
    run_performance_check, run_performance_check_with_sampler, AppSource, CrashHuntOptions,
    CrashHuntResult, FeatureShipOptions, FeatureShipResult, PerformanceCheckOptions,
    PerformanceCheckResult, PlaybookOutcome, RunOptions, ShipIteration, TerminationReason,
};
pub use progress::{ProgressEvent, ProgressReceiver, ProgressSender};
pub use report::{
    format_crash_hunt_result, format_crash_hunt_result_as_json, format_crash_hunt_result_compact,
    format_feature_ship_result, format_feature_ship_result_as_json,
    format_feature_ship_result_compact, format_performance_result,
    format_performance_result_as_json, format_performance_result_compact,
};
pub use result::{SimhuntError, SimhuntResult};
pub use rng::{Seed, SeededRng};
pub use verify::{Assertion, AssertionOutcome, AssertionVerifier, UiTreeVerifier};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::action::*;
    pub use super::driver::*;
    pub use super::mock::MockSimulator;
    pub use super::navigation::*;
    pub use super::performance::*;
    pub use super::playbook::*;
    pub use super::progress::*;
    pub use super::result::*;
    pub use super::rng::*;
    pub use super::verify::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod reexport_tests {
        use super::*;
        use std::sync::Arc;

        #[tokio::test]
        async fn test_dry_run_through_root_api() {
            let toolchain = Toolchain::from_adapter(Arc::new(MockSimulator::new()));
            let options = FeatureShipOptions::for_bundle("com.example.app")
                .with_assertion(Assertion::TextVisible {
                    text: "Welcome".to_string(),
                })
                .with_dry_run(true);
            let outcome = run_feature_ship_loop(&toolchain, options).await.unwrap();
            assert!(outcome.success);
            assert_eq!(outcome.result.termination_reason, TerminationReason::DryRun);
            assert!(format_feature_ship_result_compact(&outcome.result).starts_with("[DRY-RUN]"));
        }

        #[test]
        fn test_seeded_rng_is_reproducible() {
            let mut a = SeededRng::new(Some(7));
            let mut b = SeededRng::new(Some(7));
            assert_eq!(a.random_int(0, 1000), b.random_int(0, 1000));
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_launch_error_names_bundle() {
            let err = SimhuntError::Launch {
                bundle_id: "com.example.app".to_string(),
                message: "timed out".to_string(),
            };
            assert_eq!(err.to_string(), "Launch of com.example.app failed: timed out");
        }

        #[test]
        fn test_build_error_display() {
            let err = SimhuntError::Build {
                message: "Compilation failed".to_string(),
            };
            assert_eq!(err.to_string(), "Build failed: Compilation failed");
        }
    }
}
