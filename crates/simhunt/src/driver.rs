//! Collaborator boundary: build toolchain, simulator control, UI inspection,
//! log streaming, and screen capture.
//!
//! The engine never shells out itself. Everything it needs from the outside
//! world goes through the async traits below, bundled into a [`Toolchain`].
//! Swapping the implementation (a real `simctl` adapter, a remote device farm,
//! the in-tree [`MockSimulator`](crate::MockSimulator)) never touches the
//! playbooks.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PlaybookRunner                                              │
//! │     │                                                        │
//! │     ▼                                                        │
//! │  Toolchain ─┬─ BuildDriver     (compiler toolchain wrapper)  │
//! │             ├─ DeviceControl   (simulator control CLI)       │
//! │             ├─ UiInspector     (accessibility tree)          │
//! │             ├─ LogSource       (log stream + crash reports)  │
//! │             └─ ScreenCapture   (screenshots)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::result::SimhuntResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Boot state reported by the device-control layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatorState {
    /// Running and ready for installs/launches
    Booted,
    /// Powered off
    Shutdown,
    /// Any transitional or unrecognised state
    Unknown,
}

/// A simulator known to the device-control layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulator {
    /// Device UDID
    pub udid: String,
    /// Human-readable name, e.g. "iPhone 15 Pro"
    pub name: String,
    /// Runtime identifier, e.g. "iOS 17.2"
    pub runtime: String,
    /// Boot state
    pub state: SimulatorState,
    /// Whether the runtime is installed and usable
    pub is_available: bool,
}

impl Simulator {
    /// Create an available simulator in the given state
    #[must_use]
    pub fn new(udid: impl Into<String>, name: impl Into<String>, state: SimulatorState) -> Self {
        Self {
            udid: udid.into(),
            name: name.into(),
            runtime: "iOS 17.2".to_string(),
            state,
            is_available: true,
        }
    }

    /// Check if booted
    #[must_use]
    pub fn is_booted(&self) -> bool {
        self.state == SimulatorState::Booted
    }

    /// Check if this is an iPhone model
    #[must_use]
    pub fn is_iphone(&self) -> bool {
        self.name.starts_with("iPhone")
    }

    /// Destination descriptor understood by the build toolchain
    #[must_use]
    pub fn destination(&self) -> String {
        format!("platform=iOS Simulator,id={}", self.udid)
    }
}

/// Build request for the compiler toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// `.xcodeproj` or `.xcworkspace` path
    pub project_path: PathBuf,
    /// Scheme to build
    pub scheme: String,
    /// Build configuration, e.g. "Debug"
    pub configuration: String,
    /// Destination descriptor, see [`Simulator::destination`]
    pub destination: String,
}

/// Build outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// Whether the build succeeded
    pub success: bool,
    /// Path to the built `.app`
    pub app_path: Option<PathBuf>,
    /// Compiler warnings
    pub warnings: Vec<String>,
    /// Compiler errors
    pub errors: Vec<String>,
    /// Summary error message
    pub error: Option<String>,
}

impl BuildOutput {
    /// First available failure description
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.errors.first().cloned())
            .unwrap_or_else(|| "build failed without diagnostics".to_string())
    }
}

/// A screen point, in device points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// Create a point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.0}, {:.0})", self.x, self.y)
    }
}

/// Element frame rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Frame {
    /// Create a frame
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// One node of the accessibility tree returned by [`UiInspector`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    /// Element type, e.g. "Button"
    #[serde(rename = "type")]
    pub element_type: String,
    /// Accessibility identifier
    #[serde(default)]
    pub identifier: Option<String>,
    /// Accessibility label
    #[serde(default)]
    pub label: Option<String>,
    /// Enabled flag
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hittable flag
    #[serde(default = "default_true")]
    pub hittable: bool,
    /// Visible flag
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Frame
    #[serde(default)]
    pub frame: Frame,
    /// Children
    #[serde(default)]
    pub children: Vec<UiElement>,
}

const fn default_true() -> bool {
    true
}

impl UiElement {
    /// Create an enabled, hittable, visible element
    #[must_use]
    pub fn new(element_type: impl Into<String>, frame: Frame) -> Self {
        Self {
            element_type: element_type.into(),
            identifier: None,
            label: None,
            enabled: true,
            hittable: true,
            visible: true,
            frame,
            children: Vec::new(),
        }
    }

    /// Set identifier
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set enabled flag
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set hittable flag
    #[must_use]
    pub const fn with_hittable(mut self, hittable: bool) -> Self {
        self.hittable = hittable;
        self
    }

    /// Set visible flag
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Append a child
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first list of this element and all descendants
    #[must_use]
    pub fn flatten(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Whether this element's identifier or label equals `query`
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        self.identifier.as_deref() == Some(query) || self.label.as_deref() == Some(query)
    }

    /// Find the first element whose identifier or label matches `query`
    #[must_use]
    pub fn find(&self, query: &str) -> Option<&Self> {
        self.flatten().into_iter().find(|e| e.matches(query))
    }

    /// Find the first visible element whose identifier or label matches `query`
    #[must_use]
    pub fn find_visible(&self, query: &str) -> Option<&Self> {
        self.flatten()
            .into_iter()
            .find(|e| e.visible && e.matches(query))
    }

    /// Whether any element's label contains `text`
    #[must_use]
    pub fn contains_text(&self, text: &str) -> bool {
        self.flatten()
            .iter()
            .any(|e| e.visible && e.label.as_deref().is_some_and(|l| l.contains(text)))
    }
}

/// One line from the device log stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was emitted
    pub timestamp: DateTime<Utc>,
    /// Emitting process
    pub process: String,
    /// Message text
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped now
    #[must_use]
    pub fn now(process: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            process: process.into(),
            message: message.into(),
        }
    }
}

/// Live log stream handle; dropping it stops delivery
#[derive(Debug)]
pub struct LogStream {
    receiver: mpsc::UnboundedReceiver<LogEntry>,
}

impl LogStream {
    /// Wrap a receiver fed by the log source
    #[must_use]
    pub const fn new(receiver: mpsc::UnboundedReceiver<LogEntry>) -> Self {
        Self { receiver }
    }

    /// A stream that never yields
    #[must_use]
    pub fn closed() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self { receiver: rx }
    }

    /// Take every entry delivered so far without waiting
    pub fn drain(&mut self) -> Vec<LogEntry> {
        let mut out = Vec::new();
        while let Ok(entry) = self.receiver.try_recv() {
            out.push(entry);
        }
        out
    }
}

/// Structured crash report from the device's diagnostic store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashReport {
    /// Crashed process
    pub process: String,
    /// When the crash happened
    pub timestamp: DateTime<Utc>,
    /// Exception type, e.g. "EXC_BAD_ACCESS"
    pub exception_type: Option<String>,
    /// Signal, e.g. "SIGSEGV"
    pub signal: Option<String>,
    /// Crashed-thread summary or full report text
    pub summary: String,
}

/// Compiler toolchain wrapper
#[async_trait]
pub trait BuildDriver: Send + Sync {
    /// Build a project for a destination
    async fn build(&self, request: &BuildRequest) -> SimhuntResult<BuildOutput>;

    /// Read the bundle identifier out of a built `.app`
    async fn bundle_id_for(&self, app_path: &Path) -> SimhuntResult<String>;
}

/// Simulator control
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// All known simulators
    async fn list_devices(&self) -> SimhuntResult<Vec<Simulator>>;

    /// Booted simulators only
    async fn booted_devices(&self) -> SimhuntResult<Vec<Simulator>>;

    /// Boot a simulator
    async fn boot_device(&self, udid: &str) -> SimhuntResult<()>;

    /// Install a `.app`
    async fn install_app(&self, udid: &str, app_path: &Path) -> SimhuntResult<()>;

    /// Launch an app; resolves once the app reports ready
    async fn launch_app(&self, udid: &str, bundle_id: &str) -> SimhuntResult<()>;

    /// Terminate an app
    async fn terminate_app(&self, udid: &str, bundle_id: &str) -> SimhuntResult<()>;

    /// Tap a point
    async fn tap(&self, udid: &str, at: Point) -> SimhuntResult<()>;

    /// Swipe between two points
    async fn swipe(&self, udid: &str, from: Point, to: Point, duration_ms: u64)
        -> SimhuntResult<()>;
}

/// Accessibility tree inspection
#[async_trait]
pub trait UiInspector: Send + Sync {
    /// Current UI tree of the foreground app
    async fn inspect_ui(&self, udid: &str, bundle_id: &str) -> SimhuntResult<UiElement>;
}

/// Log stream and crash report source
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Start streaming log lines matching `predicate`
    async fn stream_log(&self, udid: &str, predicate: &str) -> SimhuntResult<LogStream>;

    /// Whether a crash report for `bundle_id` exists newer than `since`
    async fn has_recent_crashes(
        &self,
        udid: &str,
        bundle_id: &str,
        since: DateTime<Utc>,
    ) -> SimhuntResult<bool>;

    /// Crash reports newer than `since`, most recent first
    async fn crash_logs(
        &self,
        udid: &str,
        bundle_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> SimhuntResult<Vec<CrashReport>>;
}

/// Screenshot capture
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Write a PNG screenshot to `output`
    async fn screenshot(&self, udid: &str, output: &Path) -> SimhuntResult<()>;
}

/// The full set of external collaborators a playbook needs
#[derive(Clone)]
pub struct Toolchain {
    /// Build driver
    pub builder: Arc<dyn BuildDriver>,
    /// Device control
    pub device: Arc<dyn DeviceControl>,
    /// UI inspection
    pub inspector: Arc<dyn UiInspector>,
    /// Log/crash source
    pub logs: Arc<dyn LogSource>,
    /// Screen capture
    pub capture: Arc<dyn ScreenCapture>,
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}

impl Toolchain {
    /// Use one adapter for every collaborator role
    #[must_use]
    pub fn from_adapter<T>(adapter: Arc<T>) -> Self
    where
        T: BuildDriver + DeviceControl + UiInspector + LogSource + ScreenCapture + 'static,
    {
        Self {
            builder: adapter.clone(),
            device: adapter.clone(),
            inspector: adapter.clone(),
            logs: adapter.clone(),
            capture: adapter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> UiElement {
        UiElement::new("Application", Frame::new(0.0, 0.0, 393.0, 852.0))
            .with_child(
                UiElement::new("NavigationBar", Frame::new(0.0, 0.0, 393.0, 44.0))
                    .with_child(
                        UiElement::new("Button", Frame::new(10.0, 5.0, 40.0, 30.0))
                            .with_identifier("back")
                            .with_label("Back"),
                    ),
            )
            .with_child(
                UiElement::new("StaticText", Frame::new(20.0, 100.0, 200.0, 20.0))
                    .with_label("Welcome home"),
            )
    }

    mod ui_element_tests {
        use super::*;

        #[test]
        fn test_flatten_is_depth_first() {
            let root = tree();
            let types: Vec<&str> = root.flatten().iter().map(|e| e.element_type.as_str()).collect();
            assert_eq!(types, vec!["Application", "NavigationBar", "Button", "StaticText"]);
        }

        #[test]
        fn test_find_by_identifier_or_label() {
            let root = tree();
            assert!(root.find("back").is_some());
            assert!(root.find("Back").is_some());
            assert!(root.find("missing").is_none());
        }

        #[test]
        fn test_find_visible_skips_hidden_duplicate() {
            let root = UiElement::new("Application", Frame::new(0.0, 0.0, 393.0, 852.0))
                .with_child(
                    UiElement::new("Button", Frame::new(0.0, 0.0, 10.0, 10.0))
                        .with_identifier("login")
                        .with_visible(false),
                )
                .with_child(
                    UiElement::new("Button", Frame::new(100.0, 200.0, 50.0, 20.0))
                        .with_identifier("login"),
                );
            assert!(!root.find("login").unwrap().visible);
            let visible = root.find_visible("login").unwrap();
            assert_eq!(visible.frame.center(), Point::new(125.0, 210.0));
            assert!(root.find_visible("missing").is_none());
        }

        #[test]
        fn test_contains_text() {
            let root = tree();
            assert!(root.contains_text("Welcome"));
            assert!(!root.contains_text("Goodbye"));
        }

        #[test]
        fn test_frame_center() {
            let frame = Frame::new(10.0, 20.0, 100.0, 40.0);
            assert_eq!(frame.center(), Point::new(60.0, 40.0));
        }

        #[test]
        fn test_deserialize_defaults() {
            let json = r#"{"type":"Button","identifier":"ok"}"#;
            let element: UiElement = serde_json::from_str(json).unwrap();
            assert!(element.enabled && element.hittable && element.visible);
            assert!(element.children.is_empty());
        }
    }

    mod simulator_tests {
        use super::*;

        #[test]
        fn test_destination() {
            let sim = Simulator::new("ABC-123", "iPhone 15", SimulatorState::Shutdown);
            assert_eq!(sim.destination(), "platform=iOS Simulator,id=ABC-123");
            assert!(sim.is_iphone());
            assert!(!sim.is_booted());
        }

        #[test]
        fn test_build_failure_message_fallbacks() {
            let mut out = BuildOutput::default();
            assert!(out.failure_message().contains("without diagnostics"));
            out.errors.push("main.swift:3: error".to_string());
            assert_eq!(out.failure_message(), "main.swift:3: error");
            out.error = Some("Scheme not found".to_string());
            assert_eq!(out.failure_message(), "Scheme not found");
        }
    }

    mod log_stream_tests {
        use super::*;

        #[test]
        fn test_drain_returns_buffered_entries() {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut stream = LogStream::new(rx);
            tx.send(LogEntry::now("App", "one")).unwrap();
            tx.send(LogEntry::now("App", "two")).unwrap();
            let drained = stream.drain();
            assert_eq!(drained.len(), 2);
            assert!(stream.drain().is_empty());
        }

        #[test]
        fn test_closed_stream_is_empty() {
            let mut stream = LogStream::closed();
            assert!(stream.drain().is_empty());
        }
    }
}
