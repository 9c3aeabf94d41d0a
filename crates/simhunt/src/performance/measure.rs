//! Launch timing and per-flow resource measurement.

use super::sampler::{MetricsSampler, ResourceSample};
use crate::driver::DeviceControl;
use crate::navigation::{Flow, Navigator};
use crate::result::SimhuntResult;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Frame rate a smooth app holds
pub const TARGET_FPS: f64 = 60.0;

/// One cold/warm launch pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRun {
    /// 1-based run number
    pub run: u32,
    /// Cold launch time; `None` when the launch failed
    pub cold_ms: Option<f64>,
    /// Warm launch time; `None` when the launch failed
    pub warm_ms: Option<f64>,
    /// First failure in this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Time one cold launch and one warm launch.
///
/// Each launch is preceded by a terminate and a settle delay. Failures are
/// recorded on the run rather than returned.
pub async fn measure_launch_run(
    device: &dyn DeviceControl,
    udid: &str,
    bundle_id: &str,
    run: u32,
    settle: Duration,
) -> LaunchRun {
    let mut result = LaunchRun {
        run,
        cold_ms: None,
        warm_ms: None,
        error: None,
    };

    match timed_relaunch(device, udid, bundle_id, settle).await {
        Ok(ms) => result.cold_ms = Some(ms),
        Err(e) => result.error = Some(format!("cold launch: {e}")),
    }
    match timed_relaunch(device, udid, bundle_id, settle).await {
        Ok(ms) => result.warm_ms = Some(ms),
        Err(e) => {
            result.error.get_or_insert(format!("warm launch: {e}"));
        }
    }
    result
}

async fn timed_relaunch(
    device: &dyn DeviceControl,
    udid: &str,
    bundle_id: &str,
    settle: Duration,
) -> SimhuntResult<f64> {
    if let Err(e) = device.terminate_app(udid, bundle_id).await {
        // not running is fine
        tracing::debug!(error = %e, "terminate before launch failed");
    }
    tokio::time::sleep(settle).await;
    let start = Instant::now();
    device.launch_app(udid, bundle_id).await?;
    Ok(start.elapsed().as_secs_f64() * 1000.0)
}

/// Resource summary for one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMeasurement {
    /// Flow name
    pub name: String,
    /// Samples collected
    pub samples: usize,
    /// Sampler readings that failed and are missing from `samples`
    #[serde(default)]
    pub failed_samples: u32,
    /// Peak memory
    pub memory_peak_mb: f64,
    /// Mean memory
    pub memory_avg_mb: f64,
    /// Mean CPU
    pub cpu_avg_percent: f64,
    /// Peak CPU
    pub cpu_peak_percent: f64,
    /// Mean frame rate
    pub fps_avg: f64,
    /// Lowest frame rate
    pub fps_min: f64,
    /// Frames missed against [`TARGET_FPS`]
    pub dropped_frames: u64,
    /// Wall time of the flow and its sampling
    pub duration_ms: u64,
    /// Step failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowMeasurement {
    /// Summarise samples; an empty series yields zeros
    #[must_use]
    pub fn from_samples(
        name: impl Into<String>,
        samples: &[ResourceSample],
        duration_ms: u64,
        error: Option<String>,
    ) -> Self {
        let n = samples.len();
        let mean = |f: fn(&ResourceSample) -> f64| {
            if n == 0 {
                0.0
            } else {
                samples.iter().map(f).sum::<f64>() / n as f64
            }
        };
        let peak = |f: fn(&ResourceSample) -> f64| samples.iter().map(f).fold(0.0, f64::max);
        let fps_min = samples
            .iter()
            .map(|s| s.fps)
            .reduce(f64::min)
            .unwrap_or(0.0);
        let dropped_frames = samples
            .iter()
            .map(|s| (TARGET_FPS - s.fps).round().max(0.0) as u64)
            .sum();

        Self {
            name: name.into(),
            samples: n,
            failed_samples: 0,
            memory_peak_mb: peak(|s| s.memory_mb),
            memory_avg_mb: mean(|s| s.memory_mb),
            cpu_avg_percent: mean(|s| s.cpu_percent),
            cpu_peak_percent: peak(|s| s.cpu_percent),
            fps_avg: mean(|s| s.fps),
            fps_min,
            dropped_frames,
            duration_ms,
            error,
        }
    }
}

/// How many samples to take per flow and how far apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    /// Samples per flow
    pub samples: u32,
    /// Interval between samples
    pub interval: Duration,
}

/// Run `flow` while sampling resources in the same task
pub async fn measure_flow(
    navigator: &Navigator<'_>,
    sampler: &dyn MetricsSampler,
    udid: &str,
    bundle_id: &str,
    flow: &Flow,
    plan: SamplingPlan,
) -> FlowMeasurement {
    let start = Instant::now();
    let (steps, samples) = tokio::join!(
        navigator.run(&flow.steps),
        collect_samples(sampler, udid, bundle_id, plan)
    );
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    if let Err(e) = &steps {
        tracing::warn!(flow = %flow.name, error = %e, "flow step failed");
    }
    let (samples, failed_samples) = samples;
    if failed_samples > 0 {
        tracing::warn!(
            flow = %flow.name,
            failed_samples,
            planned = plan.samples,
            "resource samples missing"
        );
    }
    let mut measurement =
        FlowMeasurement::from_samples(&flow.name, &samples, duration_ms, steps.err());
    measurement.failed_samples = failed_samples;
    measurement
}

async fn collect_samples(
    sampler: &dyn MetricsSampler,
    udid: &str,
    bundle_id: &str,
    plan: SamplingPlan,
) -> (Vec<ResourceSample>, u32) {
    let mut samples = Vec::with_capacity(plan.samples as usize);
    let mut failed = 0;
    for i in 0..plan.samples {
        if i > 0 {
            tokio::time::sleep(plan.interval).await;
        }
        match sampler.sample(udid, bundle_id).await {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                failed += 1;
                tracing::debug!(error = %e, "resource sample failed");
            }
        }
    }
    (samples, failed)
}
