//! Crash Hunt views.

use super::{
    compact_error, escape_html, html_error, html_page, html_table, markdown_error, seconds,
    to_json, Banner,
};
use crate::playbook::controller::TerminationReason;
use crate::playbook::crash_hunt::CrashHuntResult;
use std::fmt::Write as _;

fn headline(result: &CrashHuntResult) -> (&'static str, String, Banner) {
    let crashes = result.crashes_found;
    if result.termination_reason == TerminationReason::DryRun {
        return ("🧪", "dry run, options valid".to_string(), Banner::Neutral);
    }
    if crashes > 0 {
        let plural = if crashes == 1 { "" } else { "es" };
        return ("💥", format!("{crashes} crash{plural} found"), Banner::Fail);
    }
    if result.completed && result.error.is_none() {
        return ("✅", "no crashes found".to_string(), Banner::Pass);
    }
    ("❌", format!("stopped: {}", result.termination_reason), Banner::Fail)
}

/// Markdown view
#[must_use]
pub fn format_crash_hunt_result(result: &CrashHuntResult) -> String {
    let (icon, headline, _) = headline(result);
    let mut out = format!("# {icon} Crash Hunt: {headline}\n\n");
    let _ = writeln!(out, "**Termination:** `{}`\n", result.termination_reason);
    out.push_str("| Metric | Value |\n|---|---|\n");
    let _ = writeln!(out, "| Simulator | {} |", result.simulator.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "| Bundle | {} |", result.bundle_id.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "| Seed | {} |", result.seed);
    let _ = writeln!(
        out,
        "| Duration | {} of {}s |",
        seconds(result.elapsed_ms),
        result.duration_secs
    );
    let _ = writeln!(out, "| Actions | {} |", result.actions_performed);
    let _ = writeln!(out, "| Crashes | {} |", result.crashes_found);
    let _ = writeln!(out, "| Max depth | {} |", result.max_depth_reached);
    let _ = writeln!(out, "| Depth resets | {} |", result.depth_resets);
    if let Some(dir) = &result.artifacts_dir {
        let _ = writeln!(out, "| Artifacts | `{}` |", dir.display());
    }

    if !result.crashes.is_empty() {
        out.push_str("\n## Crashes\n");
        for crash in &result.crashes {
            let _ = write!(
                out,
                "\n### Crash #{}: {}\n\n- Time: {}\n- Evidence: `{}`\n- Recovered: {}\n",
                crash.crash_number,
                crash.crash_type,
                crash.timestamp.to_rfc3339(),
                crash.evidence_dir.display(),
                if crash.recovered { "yes" } else { "no" }
            );
            if !crash.actions_before.is_empty() {
                out.push_str("\nSteps before the crash:\n\n");
                for action in &crash.actions_before {
                    let _ = writeln!(out, "{}", action.describe());
                }
            }
        }
    }

    markdown_error(&mut out, result.error.as_deref());
    out
}

/// Full result as pretty JSON
#[must_use]
pub fn format_crash_hunt_result_as_json(result: &CrashHuntResult) -> String {
    to_json(result)
}

/// One line for logs
#[must_use]
pub fn format_crash_hunt_result_compact(result: &CrashHuntResult) -> String {
    let token = if result.termination_reason == TerminationReason::DryRun {
        "[DRY-RUN]"
    } else if result.crashes_found > 0 {
        "[CRASH]"
    } else if result.completed {
        "[CLEAN]"
    } else {
        "[FAIL]"
    };
    let mut out = format!(
        "{token} crash_hunt reason={} actions={} crashes={} seed={} elapsed_ms={}",
        result.termination_reason,
        result.actions_performed,
        result.crashes_found,
        result.seed,
        result.elapsed_ms
    );
    compact_error(&mut out, result.error.as_deref());
    out
}

/// HTML dashboard
#[must_use]
pub fn render_html(result: &CrashHuntResult) -> String {
    let (_, headline, banner) = headline(result);
    let mut body = html_table(&[
        ("Termination", result.termination_reason.to_string()),
        ("Simulator", result.simulator.clone().unwrap_or_default()),
        ("Bundle", result.bundle_id.clone().unwrap_or_default()),
        ("Seed", result.seed.to_string()),
        ("Duration", seconds(result.elapsed_ms)),
        ("Actions", result.actions_performed.to_string()),
        ("Crashes", result.crashes_found.to_string()),
        ("Max depth", result.max_depth_reached.to_string()),
        ("Depth resets", result.depth_resets.to_string()),
    ]);

    if !result.crashes.is_empty() {
        body.push_str("<h2>Crashes</h2>\n");
        for crash in &result.crashes {
            let _ = write!(
                body,
                "<div class=\"item fail\">\n    <strong>#{} {}</strong> at {}<br>\n    \
                 evidence: <code>{}</code>\n",
                crash.crash_number,
                escape_html(&crash.crash_type),
                crash.timestamp.to_rfc3339(),
                escape_html(&crash.evidence_dir.display().to_string())
            );
            if !crash.actions_before.is_empty() {
                body.push_str("    <ol>\n");
                for action in &crash.actions_before {
                    let _ = writeln!(body, "        <li>{}</li>", escape_html(&action.describe()));
                }
                body.push_str("    </ol>\n");
            }
            body.push_str("</div>\n");
        }
    }

    if !result.actions.is_empty() {
        let failed = result.actions.iter().filter(|a| !a.success).count();
        let _ = writeln!(
            body,
            "<h2>Actions</h2>\n<p>{} performed, {failed} failed</p>",
            result.actions.len()
        );
        body.push_str(
            "<table>\n    <tr><th>#</th><th>Kind</th><th>Description</th><th>Depth</th></tr>\n",
        );
        for action in &result.actions {
            let _ = writeln!(
                body,
                "    <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                action.action_number,
                action.kind,
                escape_html(&action.describe()),
                action.depth_after_action
            );
        }
        body.push_str("</table>\n");
    }

    body.push_str(&html_error(result.error.as_deref()));
    html_page("Crash Hunt", banner, &headline, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, RecordedAction};
    use crate::crash::CrashDetection;
    use chrono::Utc;
    use std::path::PathBuf;

    fn result(reason: TerminationReason) -> CrashHuntResult {
        CrashHuntResult {
            completed: reason.is_completion(),
            termination_reason: reason,
            simulator: Some("iPhone 15".to_string()),
            bundle_id: Some("com.example.app".to_string()),
            seed: 42,
            duration_secs: 60,
            elapsed_ms: 60_010,
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

    fn with_crash(mut r: CrashHuntResult) -> CrashHuntResult {
        let mut action = RecordedAction::new(1, ActionKind::Tap, 0);
        action.success = true;
        r.actions = vec![action.clone()];
        r.actions_performed = 1;
        r.crashes = vec![CrashDetection {
            crash_number: 1,
            timestamp: Utc::now(),
            crash_type: "SIGSEGV".to_string(),
            actions_before: vec![action],
            screenshot_path: None,
            log_path: None,
            crash_report_path: None,
            ui_tree_path: None,
            reproduction_path: None,
            evidence_dir: PathBuf::from("/tmp/run/crashes/crash-1"),
            recovered: false,
        }];
        r.crashes_found = 1;
        r
    }

    mod markdown_tests {
        use super::*;

        #[test]
        fn test_clean_run_header() {
            let md = format_crash_hunt_result(&result(TerminationReason::DurationElapsed));
            assert!(md.starts_with("# ✅ Crash Hunt: no crashes found"));
            assert!(md.contains("| Seed | 42 |"));
            assert!(!md.contains("## Error"));
        }

        #[test]
        fn test_crash_listed_with_steps() {
            let md = format_crash_hunt_result(&with_crash(result(TerminationReason::CrashNoReset)));
            assert!(md.starts_with("# 💥 Crash Hunt: 1 crash found"));
            assert!(md.contains("### Crash #1: SIGSEGV"));
            assert!(md.contains("Recovered: no"));
            assert!(md.contains("1. Tap (no target)"));
        }

        #[test]
        fn test_failure_never_claims_success() {
            let mut r = result(TerminationReason::RelaunchFailed);
            r.error = Some("relaunch after crash #1 failed: <boom>".to_string());
            let md = format_crash_hunt_result(&r);
            assert!(!md.contains('✅'));
            assert!(md.contains("```\nrelaunch after crash #1 failed: <boom>\n```"));
        }
    }

    mod compact_tests {
        use super::*;

        #[test]
        fn test_tokens() {
            assert!(format_crash_hunt_result_compact(&result(TerminationReason::DurationElapsed))
                .starts_with("[CLEAN] crash_hunt reason=duration_elapsed"));
            assert!(format_crash_hunt_result_compact(&with_crash(result(
                TerminationReason::CrashNoReset
            )))
            .starts_with("[CRASH]"));
            assert!(format_crash_hunt_result_compact(&result(TerminationReason::DryRun))
                .starts_with("[DRY-RUN]"));
        }

        #[test]
        fn test_error_suffix() {
            let mut r = result(TerminationReason::Error);
            r.error = Some("tap failed".to_string());
            let line = format_crash_hunt_result_compact(&r);
            assert!(line.starts_with("[FAIL]"));
            assert!(line.ends_with(" error=\"tap failed\""));
        }
    }

    #[test]
    fn test_json_round_trips() {
        let r = with_crash(result(TerminationReason::CrashLimit));
        let back: CrashHuntResult =
            serde_json::from_str(&format_crash_hunt_result_as_json(&r)).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_html_escapes_crash_type() {
        let mut r = with_crash(result(TerminationReason::CrashNoReset));
        r.crashes[0].crash_type = "<script>".to_string();
        let html = render_html(&r);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<strong>#1 <script>"));
        assert!(html.contains("banner fail"));
    }
}
