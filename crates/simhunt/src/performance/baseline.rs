//! Stored baselines and regression detection.

use crate::result::{SimhuntError, SimhuntResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The fixed metric set compared across runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Mean cold launch time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cold_launch_avg_ms: Option<f64>,
    /// p95 cold launch time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cold_launch_p95_ms: Option<f64>,
    /// Mean warm launch time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warm_launch_avg_ms: Option<f64>,
    /// p95 warm launch time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warm_launch_p95_ms: Option<f64>,
    /// Peak memory across flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_peak_mb: Option<f64>,
    /// Mean memory across flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_avg_mb: Option<f64>,
    /// Mean CPU across flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_avg_percent: Option<f64>,
    /// Mean frame rate across flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps_avg: Option<f64>,
    /// Lowest frame rate across flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps_min: Option<f64>,
}

/// Previously recorded metrics for one app on one simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    /// When the baseline was recorded
    pub timestamp: DateTime<Utc>,
    /// Simulator name
    pub simulator: String,
    /// App
    pub bundle_id: String,
    /// Recorded values
    #[serde(flatten)]
    pub metrics: MetricSummary,
}

impl PerformanceBaseline {
    /// Fresh baseline stamped now
    #[must_use]
    pub fn from_metrics(
        metrics: MetricSummary,
        simulator: impl Into<String>,
        bundle_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            simulator: simulator.into(),
            bundle_id: bundle_id.into(),
            metrics,
        }
    }

    /// Read a baseline JSON file
    pub fn load(path: &Path) -> SimhuntResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SimhuntError::Baseline {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| SimhuntError::Baseline {
            path: path.display().to_string(),
            message: format!("invalid baseline JSON: {e}"),
        })
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> SimhuntResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Regression severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worse than the threshold
    Warning,
    /// Worse than twice the threshold
    Critical,
}

impl Severity {
    /// Pure function of the change and the threshold
    #[must_use]
    pub fn classify(change_percent: f64, threshold_percent: f64) -> Self {
        if change_percent.abs() > 2.0 * threshold_percent {
            Self::Critical
        } else {
            Self::Warning
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// Which way is worse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Launch time, memory
    LowerIsBetter,
    /// Frame rate
    HigherIsBetter,
}

/// One metric that got worse than allowed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRegression {
    /// Metric field name
    pub metric: String,
    /// Baseline value
    pub baseline_value: f64,
    /// Current value
    pub current_value: f64,
    /// Percent change, positive means worse for every metric
    pub change_percent: f64,
    /// Threshold in effect
    pub threshold_percent: f64,
    /// Severity
    pub severity: Severity,
}

/// Compare one metric; `None` when within threshold or not comparable
#[must_use]
pub fn compare_metric(
    metric: &str,
    baseline: f64,
    current: f64,
    threshold_percent: f64,
    polarity: Polarity,
) -> Option<PerformanceRegression> {
    if baseline == 0.0 || !baseline.is_finite() || !current.is_finite() {
        return None;
    }
    let raw = (current - baseline) / baseline * 100.0;
    let change_percent = match polarity {
        Polarity::LowerIsBetter => raw,
        Polarity::HigherIsBetter => -raw,
    };
    (change_percent > threshold_percent).then(|| PerformanceRegression {
        metric: metric.to_string(),
        baseline_value: baseline,
        current_value: current,
        change_percent,
        threshold_percent,
        severity: Severity::classify(change_percent, threshold_percent),
    })
}

/// Regressions over the compared metric set, in a fixed order
#[must_use]
pub fn detect_regressions(
    current: &MetricSummary,
    baseline: &MetricSummary,
    threshold_percent: f64,
) -> Vec<PerformanceRegression> {
    let compared = [
        (
            "cold_launch_avg_ms",
            baseline.cold_launch_avg_ms,
            current.cold_launch_avg_ms,
            Polarity::LowerIsBetter,
        ),
        (
            "warm_launch_avg_ms",
            baseline.warm_launch_avg_ms,
            current.warm_launch_avg_ms,
            Polarity::LowerIsBetter,
        ),
        (
            "memory_peak_mb",
            baseline.memory_peak_mb,
            current.memory_peak_mb,
            Polarity::LowerIsBetter,
        ),
        (
            "fps_min",
            baseline.fps_min,
            current.fps_min,
            Polarity::HigherIsBetter,
        ),
    ];
    compared
        .into_iter()
        .filter_map(|(metric, base, cur, polarity)| {
            compare_metric(metric, base?, cur?, threshold_percent, polarity)
        })
        .collect()
}
