//! Playbooks: multi-step workflows run against a simulator.
//!
//! Every playbook follows the same template ([`controller::PlaybookRunner`]):
//! validate options, create a run directory, resolve a simulator, set up the
//! app, iterate until a termination condition holds, then write reports.
//!
//! - **Crash Hunt** drives random UI interaction and records crashes with
//!   reproduction evidence.
//! - **Performance Check** times launches, samples resources during flows,
//!   and compares against a stored baseline.
//! - **Feature Ship Loop** rebuilds and relaunches the app until a set of UI
//!   assertions holds.
//!
//! # Example
//!
//! ```yaml
//! bundle_id: com.example.app
//! project_path: App.xcodeproj
//! scheme: App
//! max_iterations: 5
//! assertions:
//!   - type: element_exists
//!     identifier: login
//!   - type: text_visible
//!     text: Welcome
//! ```

pub mod controller;
pub mod crash_hunt;
pub mod feature_ship;
pub mod performance_check;
pub mod setup;

// Re-export primary types
pub use controller::{
    resolve_simulator, IterationOutcome, Phase, PlaybookOutcome, PlaybookRunner,
    PlaybookStrategy, RunContext, RunOptions, StartFailure, TerminationReason,
};
pub use crash_hunt::{
    run_crash_hunt, CrashHunt, CrashHuntOptions, CrashHuntResult, CrashHuntTiming,
};
pub use feature_ship::{
    run_feature_ship_loop, run_feature_ship_loop_with_verifier, FeatureShip, FeatureShipOptions,
    FeatureShipResult, FeatureShipTiming, ShipIteration,
};
pub use performance_check::{
    run_performance_check, run_performance_check_with_sampler, PerformanceCheck,
    PerformanceCheckOptions, PerformanceCheckResult, PerformanceTiming,
};
pub use setup::AppSource;
