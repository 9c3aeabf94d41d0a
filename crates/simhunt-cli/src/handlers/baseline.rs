//! Baseline command handler

use crate::commands::BaselineArgs;
use crate::error::{CliError, CliResult};
use simhunt::{MetricSummary, PerformanceBaseline};
use std::fmt::Write as _;

fn rows(metrics: &MetricSummary) -> [(&'static str, Option<f64>); 9] {
    [
        ("cold_launch_avg_ms", metrics.cold_launch_avg_ms),
        ("cold_launch_p95_ms", metrics.cold_launch_p95_ms),
        ("warm_launch_avg_ms", metrics.warm_launch_avg_ms),
        ("warm_launch_p95_ms", metrics.warm_launch_p95_ms),
        ("memory_peak_mb", metrics.memory_peak_mb),
        ("memory_avg_mb", metrics.memory_avg_mb),
        ("cpu_avg_percent", metrics.cpu_avg_percent),
        ("fps_avg", metrics.fps_avg),
        ("fps_min", metrics.fps_min),
    ]
}

/// Plain-text table of a baseline; absent metrics show as `-`
#[must_use]
pub fn render_baseline_table(baseline: &PerformanceBaseline) -> String {
    let mut out = format!(
        "Baseline for {} on {}\nRecorded {}\n\n",
        baseline.bundle_id,
        baseline.simulator,
        baseline.timestamp.to_rfc3339()
    );
    let _ = writeln!(out, "{:<20} {:>10}", "metric", "value");
    for (name, value) in rows(&baseline.metrics) {
        let value = value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
        let _ = writeln!(out, "{name:<20} {value:>10}");
    }
    out
}

/// Execute the baseline command
pub fn execute_baseline(args: &BaselineArgs) -> CliResult<String> {
    let baseline = PerformanceBaseline::load(&args.file)?;
    if args.json {
        return serde_json::to_string_pretty(&baseline)
            .map_err(|e| CliError::parse(args.file.display().to_string(), e.to_string()));
    }
    Ok(render_baseline_table(&baseline))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    const BASELINE: &str = r#"{
        "timestamp": "2026-01-02T03:04:05Z",
        "simulator": "iPhone 15",
        "bundle_id": "com.example.app",
        "cold_launch_avg_ms": 100.0,
        "fps_min": 55.25
    }"#;

    fn saved(dir: &Path) -> PathBuf {
        let path = dir.join("baseline.json");
        std::fs::write(&path, BASELINE).unwrap();
        path
    }

    #[test]
    fn test_table_lists_every_metric() {
        let tmp = tempfile::tempdir().unwrap();
        let text = execute_baseline(&BaselineArgs {
            file: saved(tmp.path()),
            json: false,
        })
        .unwrap();
        assert!(text.starts_with("Baseline for com.example.app on iPhone 15"));
        assert!(text.contains("Recorded 2026-01-02T03:04:05+00:00"));
        assert_eq!(text.lines().filter(|l| l.ends_with('-')).count(), 7);
        assert!(text.lines().any(|l| l.starts_with("cold_launch_avg_ms") && l.ends_with("100.0")));
    }

    #[test]
    fn test_json_output_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let text = execute_baseline(&BaselineArgs {
            file: saved(tmp.path()),
            json: true,
        })
        .unwrap();
        let back: PerformanceBaseline = serde_json::from_str(&text).unwrap();
        assert_eq!(back.metrics.fps_min, Some(55.25));
    }

    #[test]
    fn test_missing_file_is_library_error() {
        let err = execute_baseline(&BaselineArgs {
            file: PathBuf::from("/nonexistent/baseline.json"),
            json: false,
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Simhunt(_)));
        assert!(err.to_string().contains("Baseline error"));
    }
}
