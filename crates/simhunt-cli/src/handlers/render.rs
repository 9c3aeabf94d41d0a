//! Render command handler

use super::load_file;
use crate::commands::{PlaybookKind, RenderArgs, RenderFormat};
use crate::error::{CliError, CliResult};
use simhunt::report::{crash_hunt, feature_ship, performance};
use simhunt::{CrashHuntResult, FeatureShipResult, PerformanceCheckResult};
use std::path::Path;

/// Render a saved result file in the requested format
pub fn render_result(
    path: &Path,
    playbook: PlaybookKind,
    format: RenderFormat,
) -> CliResult<String> {
    if !matches!(path.extension().and_then(|e| e.to_str()), Some("json")) {
        return Err(CliError::invalid_argument(format!(
            "{}: results are stored as .json",
            path.display()
        )));
    }

    let text = match playbook {
        PlaybookKind::CrashHunt => {
            let result: CrashHuntResult = load_file(path)?;
            match format {
                RenderFormat::Markdown => crash_hunt::format_crash_hunt_result(&result),
                RenderFormat::Json => crash_hunt::format_crash_hunt_result_as_json(&result),
                RenderFormat::Compact => crash_hunt::format_crash_hunt_result_compact(&result),
                RenderFormat::Html => crash_hunt::render_html(&result),
            }
        }
        PlaybookKind::PerformanceCheck => {
            let result: PerformanceCheckResult = load_file(path)?;
            match format {
                RenderFormat::Markdown => performance::format_performance_result(&result),
                RenderFormat::Json => performance::format_performance_result_as_json(&result),
                RenderFormat::Compact => performance::format_performance_result_compact(&result),
                RenderFormat::Html => performance::render_html(&result),
            }
        }
        PlaybookKind::FeatureShip => {
            let result: FeatureShipResult = load_file(path)?;
            match format {
                RenderFormat::Markdown => feature_ship::format_feature_ship_result(&result),
                RenderFormat::Json => feature_ship::format_feature_ship_result_as_json(&result),
                RenderFormat::Compact => feature_ship::format_feature_ship_result_compact(&result),
                RenderFormat::Html => feature_ship::render_html(&result),
            }
        }
    };
    Ok(text)
}

/// Execute the render command; returns the text for stdout, if any
pub fn execute_render(args: &RenderArgs) -> CliResult<Option<String>> {
    let text = render_result(&args.result, args.playbook, args.format)?;
    match &args.output {
        Some(output) => {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(output, text)?;
            tracing::info!(path = %output.display(), "report written");
            Ok(None)
        }
        None => Ok(Some(text)),
    }
}
