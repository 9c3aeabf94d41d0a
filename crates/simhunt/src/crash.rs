//! Crash detection and evidence capture.
//!
//! Two independent signals count as a crash:
//!
//! - a live log line containing one of [`CRASH_SIGNATURES`], which sets a
//!   sticky flag on the [`CrashPatternMatcher`] until recovery clears it;
//! - a crash report newer than [`RECENT_CRASH_WINDOW_SECS`] seconds from the
//!   device's diagnostic store.
//!
//! Evidence capture is best-effort. Each artifact is attempted on its own and
//! a failure only leaves that artifact's path empty.

use crate::action::RecordedAction;
use crate::driver::{LogSource, LogStream, Toolchain};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Log substrings that indicate the app crashed
pub const CRASH_SIGNATURES: &[&str] = &[
    "SIGABRT",
    "SIGSEGV",
    "SIGBUS",
    "EXC_BAD_ACCESS",
    "EXC_CRASH",
    "assertion failed",
    "fatal error",
    "precondition failed",
    "Terminating app due to uncaught exception",
    "CRASH",
];

/// Actions kept as steps to reproduce
pub const ACTIONS_BEFORE_WINDOW: usize = 10;

/// Matched log lines written to the evidence bundle
pub const LOG_EXCERPT_LINES: usize = 20;

/// How far back the crash report query looks
pub const RECENT_CRASH_WINDOW_SECS: i64 = 30;

const PATTERN_LOG_CAPACITY: usize = 200;

/// Sticky matcher over incoming log lines
#[derive(Debug, Clone, Default)]
pub struct CrashPatternMatcher {
    detected: bool,
    crash_type: Option<String>,
    matched: VecDeque<String>,
}

impl CrashPatternMatcher {
    /// Create an empty matcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test one log line; returns the matching signature, if any
    pub fn observe(&mut self, line: &str) -> Option<&'static str> {
        let signature = CRASH_SIGNATURES.iter().find(|s| line.contains(**s)).copied()?;
        self.detected = true;
        if self.crash_type.is_none() {
            self.crash_type = Some(signature.to_string());
        }
        if self.matched.len() == PATTERN_LOG_CAPACITY {
            self.matched.pop_front();
        }
        self.matched.push_back(line.to_string());
        Some(signature)
    }

    /// Whether a crash line has been seen since the last reset
    #[must_use]
    pub const fn is_detected(&self) -> bool {
        self.detected
    }

    /// First signature matched since the last reset
    #[must_use]
    pub fn crash_type(&self) -> Option<&str> {
        self.crash_type.as_deref()
    }

    /// Last `n` matched lines, oldest first
    #[must_use]
    pub fn recent_lines(&self, n: usize) -> Vec<String> {
        let skip = self.matched.len().saturating_sub(n);
        self.matched.iter().skip(skip).cloned().collect()
    }

    /// Clear the flag and pattern log
    pub fn reset(&mut self) {
        self.detected = false;
        self.crash_type = None;
        self.matched.clear();
    }
}

/// One detected crash; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashDetection {
    /// 1-based, gap-free within a run
    pub crash_number: u32,
    /// When the crash was detected
    pub timestamp: DateTime<Utc>,
    /// Best-effort crash type (signal, exception, or signature)
    pub crash_type: String,
    /// Actions leading up to the crash (suffix of the action log)
    pub actions_before: Vec<RecordedAction>,
    /// Screenshot path
    pub screenshot_path: Option<PathBuf>,
    /// Log excerpt path
    pub log_path: Option<PathBuf>,
    /// Structured crash report path
    pub crash_report_path: Option<PathBuf>,
    /// UI tree snapshot path
    pub ui_tree_path: Option<PathBuf>,
    /// Reproduction script path
    pub reproduction_path: Option<PathBuf>,
    /// Evidence bundle directory
    pub evidence_dir: PathBuf,
    /// Whether the hunt relaunched the app and kept going
    pub recovered: bool,
}

/// Watches the log stream and crash report store
#[derive(Debug)]
pub struct CrashDetector {
    matcher: CrashPatternMatcher,
    stream: Option<LogStream>,
    last_crash_at: Option<DateTime<Utc>>,
}

impl CrashDetector {
    /// Create a detector; `None` relies on crash reports only
    #[must_use]
    pub fn new(stream: Option<LogStream>) -> Self {
        Self {
            matcher: CrashPatternMatcher::new(),
            stream,
            last_crash_at: None,
        }
    }

    /// Pattern matcher state
    #[must_use]
    pub const fn matcher(&self) -> &CrashPatternMatcher {
        &self.matcher
    }

    /// Check both signals; returns the crash type when a crash is present
    pub async fn check(
        &mut self,
        logs: &dyn LogSource,
        udid: &str,
        bundle_id: &str,
    ) -> Option<String> {
        if let Some(stream) = self.stream.as_mut() {
            for entry in stream.drain() {
                if let Some(signature) = self.matcher.observe(&entry.message) {
                    tracing::info!(
                        signature,
                        line = %entry.message,
                        "crash signature in log stream"
                    );
                }
            }
        }
        if self.matcher.is_detected() {
            return Some(self.matcher.crash_type().unwrap_or("unknown").to_string());
        }

        let window_start = Utc::now() - ChronoDuration::seconds(RECENT_CRASH_WINDOW_SECS);
        let since = self
            .last_crash_at
            .map_or(window_start, |last| last.max(window_start));
        match logs.has_recent_crashes(udid, bundle_id, since).await {
            Ok(true) => Some("crash_report".to_string()),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(error = %e, "crash report query failed");
                None
            }
        }
    }

    /// Remember that a crash was recorded so it is not reported again
    pub fn mark_recorded(&mut self) {
        self.last_crash_at = Some(Utc::now());
    }

    /// Clear detected-pattern state after a successful recovery.
    ///
    /// Lines still queued on the stream belong to the crash just recorded
    /// and are discarded with it.
    pub fn reset(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            let stale = stream.drain().len();
            if stale > 0 {
                tracing::debug!(stale, "discarded log lines from the recorded crash");
            }
        }
        self.matcher.reset();
    }
}

/// Inputs for one evidence bundle
#[derive(Debug)]
pub struct EvidenceRequest<'a> {
    /// Device
    pub udid: &'a str,
    /// App
    pub bundle_id: &'a str,
    /// Run artifact directory; the bundle goes under `crashes/`
    pub run_dir: &'a Path,
    /// Crash number
    pub crash_number: u32,
    /// Crash type from detection
    pub crash_type: String,
    /// Full action log so far
    pub actions: &'a [RecordedAction],
    /// Matched log lines
    pub log_lines: Vec<String>,
    /// Whether the recovery policy will relaunch the app
    pub recovering: bool,
}

/// Capture screenshot, crash report, log excerpt, UI tree, and steps to reproduce
pub async fn capture_evidence(
    toolchain: &Toolchain,
    request: EvidenceRequest<'_>,
) -> CrashDetection {
    let evidence_dir = request
        .run_dir
        .join("crashes")
        .join(format!("crash-{}", request.crash_number));
    let timestamp = Utc::now();
    let start = request.actions.len().saturating_sub(ACTIONS_BEFORE_WINDOW);
    let actions_before = request.actions[start..].to_vec();

    let mut detection = CrashDetection {
        crash_number: request.crash_number,
        timestamp,
        crash_type: request.crash_type,
        actions_before,
        screenshot_path: None,
        log_path: None,
        crash_report_path: None,
        ui_tree_path: None,
        reproduction_path: None,
        evidence_dir: evidence_dir.clone(),
        recovered: request.recovering,
    };

    if let Err(e) = tokio::fs::create_dir_all(&evidence_dir).await {
        tracing::warn!(
            dir = %evidence_dir.display(),
            error = %e,
            "cannot create evidence directory"
        );
        return detection;
    }

    let screenshot = evidence_dir.join("screenshot.png");
    match toolchain.capture.screenshot(request.udid, &screenshot).await {
        Ok(()) => detection.screenshot_path = Some(screenshot),
        Err(e) => tracing::warn!(error = %e, "crash screenshot failed"),
    }

    let since = timestamp - ChronoDuration::seconds(RECENT_CRASH_WINDOW_SECS);
    match toolchain
        .logs
        .crash_logs(request.udid, request.bundle_id, since, 1)
        .await
    {
        Ok(reports) => {
            if let Some(report) = reports.first() {
                let refined = report.signal.clone().or_else(|| report.exception_type.clone());
                if let Some(kind) = refined {
                    let generic = matches!(
                        detection.crash_type.as_str(),
                        "crash_report" | "unknown" | "CRASH"
                    );
                    if generic {
                        detection.crash_type = kind;
                    }
                }
                let path = evidence_dir.join("crash_report.json");
                if write_json(&path, report).await {
                    detection.crash_report_path = Some(path);
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "crash report fetch failed"),
    }

    let skip = request.log_lines.len().saturating_sub(LOG_EXCERPT_LINES);
    let excerpt: Vec<&str> = request.log_lines.iter().skip(skip).map(String::as_str).collect();
    let log_path = evidence_dir.join("log_excerpt.txt");
    if write_text(&log_path, &excerpt.join("\n")).await {
        detection.log_path = Some(log_path);
    }

    match toolchain
        .inspector
        .inspect_ui(request.udid, request.bundle_id)
        .await
    {
        Ok(tree) => {
            let path = evidence_dir.join("ui_tree.json");
            if write_json(&path, &tree).await {
                detection.ui_tree_path = Some(path);
            }
        }
        Err(e) => tracing::debug!(error = %e, "UI tree not captured"),
    }

    let script_json = evidence_dir.join("reproduction.json");
    let script_md = evidence_dir.join("reproduction.md");
    let json_ok = write_json(&script_json, &detection.actions_before).await;
    let md_ok = write_text(&script_md, &reproduction_markdown(&detection)).await;
    if json_ok || md_ok {
        detection.reproduction_path = Some(if json_ok { script_json } else { script_md });
    }

    detection
}

/// Human-readable steps to reproduce
#[must_use]
pub fn reproduction_markdown(detection: &CrashDetection) -> String {
    let mut out = format!(
        "# Crash #{} ({})\n\nDetected at {}\n\n## Steps to reproduce\n\n",
        detection.crash_number,
        detection.crash_type,
        detection.timestamp.to_rfc3339()
    );
    if detection.actions_before.is_empty() {
        out.push_str("_No actions recorded before the crash._\n");
    }
    for action in &detection.actions_before {
        out.push_str(&action.describe());
        out.push('\n');
    }
    out
}

async fn write_text(path: &Path, content: &str) -> bool {
    match tokio::fs::write(path, content).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "evidence write failed");
            false
        }
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(json) => write_text(path, &json).await,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "evidence serialization failed");
            false
        }
    }
}
