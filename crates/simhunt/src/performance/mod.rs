//! Launch-time and resource measurement with baseline regression analysis.
//!
//! Launch timing produces cold and warm series; each configured flow
//! produces a [`FlowMeasurement`]. Both fold into a [`MetricSummary`] that is
//! compared against a stored [`PerformanceBaseline`].

pub mod baseline;
pub mod measure;
pub mod sampler;
pub mod stats;

pub use baseline::{
    compare_metric, detect_regressions, MetricSummary, PerformanceBaseline, PerformanceRegression,
    Polarity, Severity,
};
pub use measure::{
    measure_flow, measure_launch_run, FlowMeasurement, LaunchRun, SamplingPlan, TARGET_FPS,
};
pub use sampler::{MetricsSampler, ResourceSample, SimulatedSampler};
pub use stats::{percentile, MetricStats};

/// Fold launch runs and flow measurements into the compared metric set
#[must_use]
pub fn summarize(launch_runs: &[LaunchRun], flows: &[FlowMeasurement]) -> MetricSummary {
    let cold: Vec<f64> = launch_runs.iter().filter_map(|r| r.cold_ms).collect();
    let warm: Vec<f64> = launch_runs.iter().filter_map(|r| r.warm_ms).collect();
    let cold = MetricStats::from_values(&cold);
    let warm = MetricStats::from_values(&warm);

    let sampled: Vec<&FlowMeasurement> = flows.iter().filter(|f| f.samples > 0).collect();
    let over_flows = |f: fn(&FlowMeasurement) -> f64| -> Option<f64> {
        if sampled.is_empty() {
            return None;
        }
        Some(sampled.iter().map(|m| f(m)).sum::<f64>() / sampled.len() as f64)
    };
    let memory_peak_mb = sampled.iter().map(|m| m.memory_peak_mb).reduce(f64::max);
    let fps_min = sampled.iter().map(|m| m.fps_min).reduce(f64::min);

    MetricSummary {
        cold_launch_avg_ms: cold.avg_if_any(),
        cold_launch_p95_ms: cold.p95_if_any(),
        warm_launch_avg_ms: warm.avg_if_any(),
        warm_launch_p95_ms: warm.p95_if_any(),
        memory_peak_mb,
        memory_avg_mb: over_flows(|m| m.memory_avg_mb),
        cpu_avg_percent: over_flows(|m| m.cpu_avg_percent),
        fps_avg: over_flows(|m| m.fps_avg),
        fps_min,
    }
}
