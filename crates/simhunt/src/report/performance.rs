//! Performance Check views.

use super::{
    compact_error, escape_html, html_error, html_page, html_table, markdown_error, opt, seconds,
    to_json, Banner,
};
use crate::performance::{MetricSummary, Severity};
use crate::playbook::controller::TerminationReason;
use crate::playbook::performance_check::PerformanceCheckResult;
use std::fmt::Write as _;

/// Rows of the metrics table: label, unit, current, baseline
fn metric_rows(
    current: &MetricSummary,
    baseline: Option<&MetricSummary>,
) -> Vec<(&'static str, &'static str, Option<f64>, Option<f64>)> {
    let b = baseline.copied().unwrap_or_default();
    vec![
        ("Cold launch avg", "ms", current.cold_launch_avg_ms, b.cold_launch_avg_ms),
        ("Cold launch p95", "ms", current.cold_launch_p95_ms, b.cold_launch_p95_ms),
        ("Warm launch avg", "ms", current.warm_launch_avg_ms, b.warm_launch_avg_ms),
        ("Warm launch p95", "ms", current.warm_launch_p95_ms, b.warm_launch_p95_ms),
        ("Memory peak", "MB", current.memory_peak_mb, b.memory_peak_mb),
        ("Memory avg", "MB", current.memory_avg_mb, b.memory_avg_mb),
        ("CPU avg", "%", current.cpu_avg_percent, b.cpu_avg_percent),
        ("FPS avg", "", current.fps_avg, b.fps_avg),
        ("FPS min", "", current.fps_min, b.fps_min),
    ]
}

fn headline(result: &PerformanceCheckResult) -> (&'static str, String, Banner) {
    match result.termination_reason {
        TerminationReason::DryRun => {
            ("🧪", "dry run, options valid".to_string(), Banner::Neutral)
        }
        TerminationReason::RegressionsFound => {
            let n = result.regressions_found;
            let plural = if n == 1 { "" } else { "s" };
            ("⚠️", format!("{n} regression{plural} found"), Banner::Warn)
        }
        TerminationReason::WithinThreshold if result.baseline.is_some() => (
            "✅",
            format!("within {}% of baseline", result.threshold_percent),
            Banner::Pass,
        ),
        TerminationReason::WithinThreshold => {
            ("✅", "measured, no baseline compared".to_string(), Banner::Pass)
        }
        reason => ("❌", format!("stopped: {reason}"), Banner::Fail),
    }
}

fn simulated_note(result: &PerformanceCheckResult) -> Option<String> {
    (result.sampler == "simulated" && !result.flows.is_empty()).then(|| {
        "Resource readings come from the simulated sampler and do not reflect the app.".to_string()
    })
}

/// Markdown view
#[must_use]
pub fn format_performance_result(result: &PerformanceCheckResult) -> String {
    let (icon, headline, _) = headline(result);
    let mut out = format!("# {icon} Performance Check: {headline}\n\n");
    let _ = writeln!(out, "**Termination:** `{}`\n", result.termination_reason);
    let _ = writeln!(
        out,
        "- Simulator: {}\n- Bundle: {}\n- Runs: {} ({} recorded)\n- Threshold: {}%\n- Elapsed: {}",
        result.simulator.as_deref().unwrap_or("-"),
        result.bundle_id.as_deref().unwrap_or("-"),
        result.runs,
        result.launch_runs.len(),
        result.threshold_percent,
        seconds(result.elapsed_ms)
    );
    if let Some(path) = &result.baseline_path {
        let saved = if result.baseline_saved { " (saved)" } else { "" };
        let _ = writeln!(out, "- Baseline: `{}`{saved}", path.display());
    }
    if let Some(error) = &result.baseline_error {
        let _ = writeln!(out, "- Baseline skipped: {error}");
    }

    if result.termination_reason != TerminationReason::DryRun {
        out.push_str("\n## Metrics\n\n| Metric | Current | Baseline |\n|---|---|---|\n");
        let baseline = result.baseline.as_ref().map(|b| &b.metrics);
        for (label, unit, current, base) in metric_rows(&result.metrics, baseline) {
            let _ = writeln!(
                out,
                "| {label}{} | {} | {} |",
                if unit.is_empty() { String::new() } else { format!(" ({unit})") },
                opt(current, 1),
                opt(base, 1)
            );
        }
    }

    if !result.regressions.is_empty() {
        out.push_str("\n## Regressions\n\n");
        for r in &result.regressions {
            let icon = match r.severity {
                Severity::Critical => "🔴",
                Severity::Warning => "🟡",
            };
            let _ = writeln!(
                out,
                "- {icon} **{}** {:.1} → {:.1} (+{:.1}%, threshold {}%, {})",
                r.metric,
                r.baseline_value,
                r.current_value,
                r.change_percent,
                r.threshold_percent,
                r.severity
            );
        }
    }

    if !result.flows.is_empty() {
        out.push_str(
            "\n## Flows\n\n\
             | Flow | Samples | Mem peak (MB) | CPU avg (%) | FPS avg | FPS min | Dropped |\n\
             |---|---|---|---|---|---|---|\n",
        );
        for flow in &result.flows {
            let samples = if flow.failed_samples > 0 {
                format!("{} ({} failed)", flow.samples, flow.failed_samples)
            } else {
                flow.samples.to_string()
            };
            let _ = writeln!(
                out,
                "| {} | {} | {:.1} | {:.1} | {:.1} | {:.1} | {} |",
                flow.name,
                samples,
                flow.memory_peak_mb,
                flow.cpu_avg_percent,
                flow.fps_avg,
                flow.fps_min,
                flow.dropped_frames
            );
        }
        for flow in result.flows.iter().filter(|f| f.error.is_some()) {
            let _ = writeln!(
                out,
                "\n- Flow `{}` step failed: {}",
                flow.name,
                flow.error.as_deref().unwrap_or_default()
            );
        }
    }

    if let Some(note) = simulated_note(result) {
        let _ = writeln!(out, "\n_{note}_");
    }

    markdown_error(&mut out, result.error.as_deref());
    out
}

/// Full result as pretty JSON
#[must_use]
pub fn format_performance_result_as_json(result: &PerformanceCheckResult) -> String {
    to_json(result)
}

/// One line for logs
#[must_use]
pub fn format_performance_result_compact(result: &PerformanceCheckResult) -> String {
    let token = match result.termination_reason {
        TerminationReason::DryRun => "[DRY-RUN]",
        TerminationReason::RegressionsFound => "[REGRESS]",
        TerminationReason::WithinThreshold => "[PASS]",
        _ => "[FAIL]",
    };
    let mut out = format!(
        "{token} performance_check reason={} runs={}/{} cold_avg_ms={} warm_avg_ms={} \
         regressions={} elapsed_ms={}",
        result.termination_reason,
        result.launch_runs.len(),
        result.runs,
        opt(result.metrics.cold_launch_avg_ms, 1),
        opt(result.metrics.warm_launch_avg_ms, 1),
        result.regressions_found,
        result.elapsed_ms
    );
    compact_error(&mut out, result.error.as_deref());
    out
}

/// HTML dashboard
#[must_use]
pub fn render_html(result: &PerformanceCheckResult) -> String {
    let (_, headline, banner) = headline(result);
    let mut body = html_table(&[
        ("Termination", result.termination_reason.to_string()),
        ("Simulator", result.simulator.clone().unwrap_or_default()),
        ("Bundle", result.bundle_id.clone().unwrap_or_default()),
        ("Runs", format!("{} of {}", result.launch_runs.len(), result.runs)),
        ("Threshold", format!("{}%", result.threshold_percent)),
        ("Sampler", result.sampler.clone()),
        ("Elapsed", seconds(result.elapsed_ms)),
    ]);

    if result.termination_reason != TerminationReason::DryRun {
        body.push_str(
            "<h2>Metrics</h2>\n<table>\n    \
             <tr><th>Metric</th><th>Current</th><th>Baseline</th></tr>\n",
        );
        let baseline = result.baseline.as_ref().map(|b| &b.metrics);
        for (label, unit, current, base) in metric_rows(&result.metrics, baseline) {
            let _ = writeln!(
                body,
                "    <tr><td>{label} {unit}</td><td>{}</td><td>{}</td></tr>",
                opt(current, 1),
                opt(base, 1)
            );
        }
        body.push_str("</table>\n");
    }

    if let Some(error) = &result.baseline_error {
        let _ = writeln!(
            body,
            "<p class=\"note\">Baseline skipped: {}</p>",
            escape_html(error)
        );
    }

    if !result.regressions.is_empty() {
        body.push_str("<h2>Regressions</h2>\n");
        for r in &result.regressions {
            let class = match r.severity {
                Severity::Critical => "fail",
                Severity::Warning => "warn",
            };
            let _ = writeln!(
                body,
                "<div class=\"item {class}\"><strong>{}</strong> \
                 {:.1} → {:.1} (+{:.1}%, {})</div>",
                escape_html(&r.metric),
                r.baseline_value,
                r.current_value,
                r.change_percent,
                r.severity
            );
        }
    }

    if !result.launch_runs.is_empty() {
        body.push_str(
            "<h2>Launch runs</h2>\n<table>\n    \
             <tr><th>Run</th><th>Cold (ms)</th><th>Warm (ms)</th><th>Error</th></tr>\n",
        );
        for run in &result.launch_runs {
            let _ = writeln!(
                body,
                "    <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                run.run,
                opt(run.cold_ms, 1),
                opt(run.warm_ms, 1),
                escape_html(run.error.as_deref().unwrap_or_default())
            );
        }
        body.push_str("</table>\n");
    }

    if !result.flows.is_empty() {
        body.push_str(
            "<h2>Flows</h2>\n<table>\n    <tr><th>Flow</th><th>Mem peak (MB)</th>\
             <th>CPU avg (%)</th><th>FPS min</th><th>Dropped</th></tr>\n",
        );
        for flow in &result.flows {
            let _ = writeln!(
                body,
                "    <tr><td>{}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td><td>{}</td></tr>",
                escape_html(&flow.name),
                flow.memory_peak_mb,
                flow.cpu_avg_percent,
                flow.fps_min,
                flow.dropped_frames
            );
        }
        body.push_str("</table>\n");
    }

    if let Some(note) = simulated_note(result) {
        let _ = writeln!(body, "<p class=\"note\">{note}</p>");
    }

    body.push_str(&html_error(result.error.as_deref()));
    html_page("Performance Check", banner, &headline, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::{
        FlowMeasurement, LaunchRun, MetricStats, PerformanceBaseline, PerformanceRegression,
    };
    use std::path::PathBuf;

    fn result(reason: TerminationReason) -> PerformanceCheckResult {
        PerformanceCheckResult {
            completed: reason.is_completion(),
            termination_reason: reason,
            simulator: Some("iPhone 15".to_string()),
            bundle_id: Some("com.example.app".to_string()),
            runs: 2,
            launch_runs: vec![
                LaunchRun { run: 1, cold_ms: Some(150.0), warm_ms: Some(40.0), error: None },
                LaunchRun { run: 2, cold_ms: Some(150.0), warm_ms: Some(40.0), error: None },
            ],
            cold_launch: MetricStats::from_values(&[150.0, 150.0]),
            warm_launch: MetricStats::from_values(&[40.0, 40.0]),
            flows: Vec::new(),
            metrics: MetricSummary {
                cold_launch_avg_ms: Some(150.0),
                cold_launch_p95_ms: Some(150.0),
                warm_launch_avg_ms: Some(40.0),
                warm_launch_p95_ms: Some(40.0),
                ..MetricSummary::default()
            },
            sampler: "simulated".to_string(),
            baseline_path: Some(PathBuf::from("baseline.json")),
            baseline: None,
            baseline_error: None,
            baseline_saved: false,
            threshold_percent: 10.0,
            regressions_found: 0,
            regressions: Vec::new(),
            elapsed_ms: 3_000,
            artifacts_dir: None,
            error: None,
        }
    }

    fn regressed() -> PerformanceCheckResult {
        let mut r = result(TerminationReason::RegressionsFound);
        r.baseline = Some(PerformanceBaseline::from_metrics(
            MetricSummary { cold_launch_avg_ms: Some(100.0), ..MetricSummary::default() },
            "iPhone 15",
            "com.example.app",
        ));
        r.regressions = vec![PerformanceRegression {
            metric: "cold_launch_avg_ms".to_string(),
            baseline_value: 100.0,
            current_value: 150.0,
            change_percent: 50.0,
            threshold_percent: 10.0,
            severity: Severity::Critical,
        }];
        r.regressions_found = 1;
        r
    }

    mod markdown_tests {
        use super::*;

        #[test]
        fn test_regressions_listed() {
            let md = format_performance_result(&regressed());
            assert!(md.starts_with("# ⚠️ Performance Check: 1 regression found"));
            assert!(md.contains("**cold_launch_avg_ms** 100.0 → 150.0 (+50.0%"));
            assert!(md.contains("critical"));
            assert!(md.contains("| Cold launch avg (ms) | 150.0 | 100.0 |"));
        }

        #[test]
        fn test_no_baseline_column_shows_dash() {
            let md = format_performance_result(&result(TerminationReason::WithinThreshold));
            assert!(md.contains("measured, no baseline compared"));
            assert!(md.contains("| Warm launch avg (ms) | 40.0 | - |"));
            assert!(md.contains("| FPS min | - | - |"));
        }

        #[test]
        fn test_baseline_error_shown() {
            let mut r = result(TerminationReason::WithinThreshold);
            r.baseline_error = Some("invalid baseline JSON".to_string());
            let md = format_performance_result(&r);
            assert!(md.contains("Baseline skipped: invalid baseline JSON"));
        }

        #[test]
        fn test_simulated_note_only_with_flows() {
            let mut r = result(TerminationReason::WithinThreshold);
            assert!(!format_performance_result(&r).contains("simulated sampler"));
            r.flows.push(FlowMeasurement::from_samples("idle", &[], 10, None));
            assert!(format_performance_result(&r).contains("simulated sampler"));
        }

        #[test]
        fn test_failed_samples_shown_in_flow_table() {
            let mut r = result(TerminationReason::WithinThreshold);
            let mut flow = FlowMeasurement::from_samples("feed", &[], 10, None);
            flow.failed_samples = 4;
            r.flows.push(flow);
            assert!(format_performance_result(&r).contains("| feed | 0 (4 failed) |"));
        }

        #[test]
        fn test_failure_never_claims_success() {
            let mut r = result(TerminationReason::Error);
            r.error = Some("no simulator available".to_string());
            let md = format_performance_result(&r);
            assert!(md.starts_with("# ❌"));
            assert!(!md.contains('✅'));
            assert!(md.contains("```\nno simulator available\n```"));
        }
    }

    #[test]
    fn test_compact_tokens() {
        assert!(format_performance_result_compact(&regressed()).starts_with(
            "[REGRESS] performance_check reason=regressions_found runs=2/2 cold_avg_ms=150.0"
        ));
        assert!(format_performance_result_compact(&result(TerminationReason::WithinThreshold))
            .starts_with("[PASS]"));
        assert!(format_performance_result_compact(&result(TerminationReason::BuildFailed))
            .starts_with("[FAIL]"));
    }

    #[test]
    fn test_json_round_trips() {
        let r = regressed();
        let back: PerformanceCheckResult =
            serde_json::from_str(&format_performance_result_as_json(&r)).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_html_banner_follows_severity() {
        let html = render_html(&regressed());
        assert!(html.contains("banner warn"));
        assert!(html.contains("item fail"));
        assert!(html.contains("<td>1</td><td>150.0</td><td>40.0</td>"));
    }
}
