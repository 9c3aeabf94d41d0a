//! Report generation.
//!
//! Every playbook gets three pure text views of its result (Markdown, JSON,
//! and a one-line compact form for logs) plus an HTML dashboard.
//! [`write_reports`] persists the JSON and HTML views into the run
//! directory at the end of every run.

pub mod crash_hunt;
pub mod feature_ship;
pub mod performance;

pub use crash_hunt::{
    format_crash_hunt_result, format_crash_hunt_result_as_json, format_crash_hunt_result_compact,
};
pub use feature_ship::{
    format_feature_ship_result, format_feature_ship_result_as_json,
    format_feature_ship_result_compact,
};
pub use performance::{
    format_performance_result, format_performance_result_as_json,
    format_performance_result_compact,
};

use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Files written by [`write_reports`]; `None` where the write failed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportPaths {
    /// `<name>.json`
    pub json: Option<PathBuf>,
    /// `<name>.html`
    pub html: Option<PathBuf>,
}

/// Write `<name>.json` and `<name>.html` into `dir`.
///
/// Failures are logged and swallowed: a report that cannot be written never
/// changes the outcome of a run.
pub async fn write_reports<T: Serialize + ?Sized>(
    dir: &Path,
    name: &str,
    value: &T,
    html: &str,
) -> ReportPaths {
    let mut paths = ReportPaths::default();

    let json_path = dir.join(format!("{name}.json"));
    match serde_json::to_string_pretty(value) {
        Ok(json) => match tokio::fs::write(&json_path, json).await {
            Ok(()) => paths.json = Some(json_path),
            Err(e) => {
                tracing::warn!(path = %json_path.display(), error = %e, "JSON report not written");
            }
        },
        Err(e) => tracing::warn!(error = %e, "result could not be serialized"),
    }

    let html_path = dir.join(format!("{name}.html"));
    match tokio::fs::write(&html_path, html).await {
        Ok(()) => paths.html = Some(html_path),
        Err(e) => {
            tracing::warn!(path = %html_path.display(), error = %e, "HTML report not written");
        }
    }

    tracing::debug!(dir = %dir.display(), name, "reports written");
    paths
}

/// Pretty JSON, falling back to an error object
pub(crate) fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

/// Fenced error block appended to Markdown views; text is kept verbatim
pub(crate) fn markdown_error(out: &mut String, error: Option<&str>) {
    if let Some(error) = error {
        let _ = write!(out, "\n## Error\n\n```\n{error}\n```\n");
    }
}

/// ` error="..."` suffix for compact views
pub(crate) fn compact_error(out: &mut String, error: Option<&str>) {
    if let Some(error) = error {
        let escaped = error.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
        let _ = write!(out, " error=\"{escaped}\"");
    }
}

/// Seconds with one decimal
pub(crate) fn seconds(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

/// Optional value with a fixed number of decimals, `-` when absent
pub(crate) fn opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.decimals$}"))
}

/// Escape HTML special characters
pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Dashboard status banner class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Banner {
    Pass,
    Warn,
    Fail,
    Neutral,
}

impl Banner {
    const fn class(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Neutral => "neutral",
        }
    }
}

/// Wrap a dashboard body in the shared page shell
pub(crate) fn html_page(title: &str, banner: Banner, headline: &str, body: &str) -> String {
    let mut html = String::new();
    html.push_str(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
"#,
    );
    let _ = writeln!(html, "    <title>{}</title>", escape_html(title));
    html.push_str(
        r#"    <style>
        body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 20px; }
        .banner { padding: 20px; border-radius: 8px; margin-bottom: 20px; }
        .banner.pass { background: #e8f5e9; border-left: 6px solid #4caf50; }
        .banner.warn { background: #fff3e0; border-left: 6px solid #ff9800; }
        .banner.fail { background: #ffebee; border-left: 6px solid #f44336; }
        .banner.neutral { background: #f5f5f5; border-left: 6px solid #9e9e9e; }
        table { border-collapse: collapse; margin: 10px 0; }
        th, td { border: 1px solid #ddd; padding: 6px 10px; text-align: left; }
        th { background: #fafafa; }
        .item { padding: 10px; margin: 5px 0; border-radius: 4px; }
        .item.pass { background: #e8f5e9; border-left: 4px solid #4caf50; }
        .item.fail { background: #ffebee; border-left: 4px solid #f44336; }
        .item.warn { background: #fff3e0; border-left: 4px solid #ff9800; }
        .error { color: #d32f2f; font-family: monospace; white-space: pre-wrap; }
        .note { color: #757575; font-style: italic; }
    </style>
</head>
<body>
"#,
    );
    let _ = write!(
        html,
        "<div class=\"banner {}\">\n    <h1>{}</h1>\n    <h2>{}</h2>\n</div>\n",
        banner.class(),
        escape_html(title),
        escape_html(headline)
    );
    html.push_str(body);
    html.push_str(
        r#"
<footer>
    <p>Generated by simhunt</p>
</footer>
</body>
</html>
"#,
    );
    html
}

/// Two-column HTML table; values are escaped
pub(crate) fn html_table(rows: &[(&str, String)]) -> String {
    let mut html = String::from("<table>\n");
    for (key, value) in rows {
        let _ = writeln!(
            html,
            "    <tr><th>{}</th><td>{}</td></tr>",
            escape_html(key),
            escape_html(value)
        );
    }
    html.push_str("</table>\n");
    html
}

/// Error block for dashboards
pub(crate) fn html_error(error: Option<&str>) -> String {
    error.map_or_else(String::new, |e| {
        format!(
            "<h2>Error</h2>\n<div class=\"error\">{}</div>\n",
            escape_html(e)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod write_tests {
        use super::*;

        #[tokio::test]
        async fn test_writes_both_files() {
            let tmp = tempfile::tempdir().unwrap();
            let value = serde_json::json!({"completed": true});
            let paths = write_reports(tmp.path(), "x_report", &value, "<html></html>").await;
            let json = paths.json.unwrap();
            assert_eq!(json, tmp.path().join("x_report.json"));
            let written: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
            assert_eq!(written["completed"], true);
            assert!(paths.html.unwrap().exists());
        }

        #[tokio::test]
        async fn test_missing_directory_is_swallowed() {
            let tmp = tempfile::tempdir().unwrap();
            let gone = tmp.path().join("does-not-exist");
            let paths = write_reports(&gone, "x_report", &1, "").await;
            assert_eq!(paths, ReportPaths::default());
        }
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn test_escape_html() {
            assert_eq!(
                escape_html("<a href=\"x\">&'</a>"),
                "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
            );
        }

        #[test]
        fn test_compact_error_stays_on_one_line() {
            let mut out = String::from("[FAIL]");
            compact_error(&mut out, Some("line \"one\"\nline two"));
            assert_eq!(out, "[FAIL] error=\"line \\\"one\\\"\\nline two\"");
            assert!(!out.contains('\n'));
        }

        #[test]
        fn test_markdown_error_is_verbatim() {
            let mut out = String::new();
            markdown_error(&mut out, Some("xcodebuild: error <1>"));
            assert!(out.contains("```\nxcodebuild: error <1>\n```"));
        }

        #[test]
        fn test_opt_and_seconds() {
            assert_eq!(opt(Some(1.234), 1), "1.2");
            assert_eq!(opt(None, 1), "-");
            assert_eq!(seconds(1_240), "1.2s");
        }

        #[test]
        fn test_page_shell_escapes_headline() {
            let html = html_page("T", Banner::Fail, "<script>", "<p>body</p>");
            assert!(html.contains("banner fail"));
            assert!(html.contains("&lt;script&gt;"));
            assert!(html.contains("<p>body</p>"));
        }
    }
}
