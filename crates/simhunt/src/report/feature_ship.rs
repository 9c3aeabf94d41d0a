//! Feature Ship Loop views.

use super::{
    compact_error, escape_html, html_error, html_page, html_table, markdown_error, seconds,
    to_json, Banner,
};
use crate::playbook::controller::TerminationReason;
use crate::playbook::feature_ship::{FeatureShipResult, ShipIteration};
use std::fmt::Write as _;

fn headline(result: &FeatureShipResult) -> (&'static str, String, Banner) {
    match result.termination_reason {
        TerminationReason::DryRun => {
            ("🧪", "dry run, options valid".to_string(), Banner::Neutral)
        }
        TerminationReason::AssertionsPassed => (
            "✅",
            format!(
                "all assertions passed on iteration {}",
                result.iterations_run
            ),
            Banner::Pass,
        ),
        TerminationReason::MaxIterations => (
            "❌",
            format!("assertions still failing after {} iterations", result.iterations_run),
            Banner::Fail,
        ),
        reason => ("❌", format!("stopped: {reason}"), Banner::Fail),
    }
}

/// Passed and total over the last iteration
fn last_counts(result: &FeatureShipResult) -> (u32, u32) {
    result.iterations.last().map_or((0, 0), |i| {
        (i.passed, i.passed + i.failed + i.skipped)
    })
}

fn iteration_summary(iteration: &ShipIteration) -> String {
    let mut line = format!(
        "{} passed, {} failed, {} skipped in {}",
        iteration.passed,
        iteration.failed,
        iteration.skipped,
        seconds(iteration.duration_ms)
    );
    if iteration.rebuilt {
        line.push_str(", rebuilt");
    }
    line
}

/// Markdown view
#[must_use]
pub fn format_feature_ship_result(result: &FeatureShipResult) -> String {
    let (icon, headline, _) = headline(result);
    let mut out = format!("# {icon} Feature Ship Loop: {headline}\n\n");
    let _ = writeln!(out, "**Termination:** `{}`\n", result.termination_reason);
    let _ = writeln!(
        out,
        "- Simulator: {}\n- Bundle: {}\n- Iterations: {} of {}\n- Builds: {}\n- Elapsed: {}",
        result.simulator.as_deref().unwrap_or("-"),
        result.bundle_id.as_deref().unwrap_or("-"),
        result.iterations_run,
        result.max_iterations,
        result.builds,
        seconds(result.elapsed_ms)
    );

    for iteration in &result.iterations {
        let _ = writeln!(
            out,
            "\n## Iteration {}\n\n{}\n",
            iteration.iteration,
            iteration_summary(iteration)
        );
        if let Some(error) = &iteration.navigation_error {
            let _ = writeln!(out, "Navigation failed: {error}\n");
        }
        for outcome in &iteration.assertions {
            match (outcome.passed, &outcome.message) {
                (true, _) => {
                    let _ = writeln!(out, "- ✓ {}", outcome.description);
                }
                (false, Some(message)) => {
                    let _ = writeln!(out, "- ✗ {}: {message}", outcome.description);
                }
                (false, None) => {
                    let _ = writeln!(out, "- ✗ {}", outcome.description);
                }
            }
        }
        if let Some(path) = &iteration.screenshot_path {
            let _ = writeln!(out, "\nScreenshot: `{}`", path.display());
        }
    }

    markdown_error(&mut out, result.error.as_deref());
    out
}

/// Full result as pretty JSON
#[must_use]
pub fn format_feature_ship_result_as_json(result: &FeatureShipResult) -> String {
    to_json(result)
}

/// One line for logs
#[must_use]
pub fn format_feature_ship_result_compact(result: &FeatureShipResult) -> String {
    let token = match result.termination_reason {
        TerminationReason::DryRun => "[DRY-RUN]",
        TerminationReason::AssertionsPassed => "[PASS]",
        _ => "[FAIL]",
    };
    let (passed, total) = last_counts(result);
    let mut out = format!(
        "{token} feature_ship reason={} iterations={}/{} passed={passed}/{total} \
         builds={} elapsed_ms={}",
        result.termination_reason,
        result.iterations_run,
        result.max_iterations,
        result.builds,
        result.elapsed_ms
    );
    compact_error(&mut out, result.error.as_deref());
    out
}

/// HTML dashboard
#[must_use]
pub fn render_html(result: &FeatureShipResult) -> String {
    let (_, headline, banner) = headline(result);
    let (passed, total) = last_counts(result);
    let mut body = html_table(&[
        ("Termination", result.termination_reason.to_string()),
        ("Simulator", result.simulator.clone().unwrap_or_default()),
        ("Bundle", result.bundle_id.clone().unwrap_or_default()),
        (
            "Iterations",
            format!("{} of {}", result.iterations_run, result.max_iterations),
        ),
        ("Builds", result.builds.to_string()),
        ("Last iteration", format!("{passed}/{total} assertions passed")),
        ("Elapsed", seconds(result.elapsed_ms)),
    ]);

    for iteration in &result.iterations {
        let _ = writeln!(
            body,
            "<h2>Iteration {}</h2>\n<p>{}</p>",
            iteration.iteration,
            escape_html(&iteration_summary(iteration))
        );
        if let Some(error) = &iteration.navigation_error {
            let _ = writeln!(
                body,
                "<div class=\"item warn\">Navigation failed: {}</div>",
                escape_html(error)
            );
        }
        for outcome in &iteration.assertions {
            let (class, mark) = if outcome.passed { ("pass", "✓") } else { ("fail", "✗") };
            let _ = write!(
                body,
                "<div class=\"item {class}\">{mark} {}",
                escape_html(&outcome.description)
            );
            if let Some(message) = &outcome.message {
                let _ = write!(body, "<br><span class=\"error\">{}</span>", escape_html(message));
            }
            body.push_str("</div>\n");
        }
        if let Some(path) = &iteration.screenshot_path {
            let _ = writeln!(
                body,
                "<p class=\"note\">screenshot: <code>{}</code></p>",
                escape_html(&path.display().to_string())
            );
        }
    }

    body.push_str(&html_error(result.error.as_deref()));
    html_page("Feature Ship Loop", banner, &headline, &body)
}
