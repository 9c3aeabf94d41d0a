//! In-memory simulator implementing every collaborator trait.
//!
//! Used by the test suite and by hosts that want to exercise a playbook
//! without a real device. Behaviour is scripted through `with_*` builders;
//! every call is recorded so tests can assert on what the engine did.

use crate::driver::{
    BuildDriver, BuildOutput, BuildRequest, CrashReport, DeviceControl, Frame, LogEntry,
    LogSource, LogStream, Point, ScreenCapture, Simulator, SimulatorState, UiElement,
    UiInspector,
};
use crate::result::{SimhuntError, SimhuntResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<Simulator>,
    calls: Vec<String>,
    launches: u32,
    gestures: u32,
    builds: u32,
    log_sender: Option<mpsc::UnboundedSender<LogEntry>>,
    crash_emitted: bool,
    tail_emitted: bool,
}

/// Scripted simulator for tests
#[derive(Debug)]
pub struct MockSimulator {
    state: Mutex<MockState>,
    ui_tree: Option<UiElement>,
    cold_launch_latency: Duration,
    warm_launch_latency: Duration,
    recent_crash: bool,
    crash_after_gestures: Option<u32>,
    crash_log_line: String,
    crash_log_tail: Option<String>,
    fail_build_from: Option<u32>,
    fail_install: bool,
    fail_launch_after: Option<u32>,
    fail_gestures: bool,
    fail_screenshot: bool,
    bundle_id: String,
    app_path: PathBuf,
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSimulator {
    /// One booted iPhone, a small UI tree, zero latency, no crashes
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                devices: vec![Simulator::new(
                    "MOCK-UDID-1",
                    "iPhone 15",
                    SimulatorState::Booted,
                )],
                ..MockState::default()
            }),
            ui_tree: Some(Self::sample_ui_tree()),
            cold_launch_latency: Duration::ZERO,
            warm_launch_latency: Duration::ZERO,
            recent_crash: false,
            crash_after_gestures: None,
            crash_log_line: "Terminating app due to uncaught exception 'NSRangeException'"
                .to_string(),
            crash_log_tail: None,
            fail_build_from: None,
            fail_install: false,
            fail_launch_after: None,
            fail_gestures: false,
            fail_screenshot: false,
            bundle_id: "com.example.mock".to_string(),
            app_path: PathBuf::from(
                "/tmp/DerivedData/Build/Products/Debug-iphonesimulator/Mock.app",
            ),
        }
    }

    /// A screen with a navigation bar, two buttons, a cell, and a disabled button
    #[must_use]
    pub fn sample_ui_tree() -> UiElement {
        UiElement::new("Application", Frame::new(0.0, 0.0, 393.0, 852.0))
            .with_child(
                UiElement::new("NavigationBar", Frame::new(0.0, 47.0, 393.0, 44.0)).with_child(
                    UiElement::new("Button", Frame::new(8.0, 50.0, 60.0, 38.0))
                        .with_identifier("settings")
                        .with_label("Settings"),
                ),
            )
            .with_child(
                UiElement::new("Button", Frame::new(40.0, 300.0, 313.0, 50.0))
                    .with_identifier("login")
                    .with_label("Log In"),
            )
            .with_child(
                UiElement::new("Cell", Frame::new(0.0, 400.0, 393.0, 60.0))
                    .with_identifier("row-0")
                    .with_label("First row"),
            )
            .with_child(
                UiElement::new("Button", Frame::new(40.0, 700.0, 313.0, 50.0))
                    .with_identifier("delete")
                    .with_enabled(false),
            )
    }

    /// Replace the device list
    #[must_use]
    pub fn with_devices(self, devices: Vec<Simulator>) -> Self {
        self.lock().devices = devices;
        self
    }

    /// Replace the UI tree; `None` makes inspection fail
    #[must_use]
    pub fn with_ui_tree(mut self, tree: Option<UiElement>) -> Self {
        self.ui_tree = tree;
        self
    }

    /// Latency of odd-numbered (cold) launches
    #[must_use]
    pub const fn with_cold_launch_latency(mut self, latency: Duration) -> Self {
        self.cold_launch_latency = latency;
        self
    }

    /// Latency of even-numbered (warm) launches
    #[must_use]
    pub const fn with_warm_launch_latency(mut self, latency: Duration) -> Self {
        self.warm_launch_latency = latency;
        self
    }

    /// Crash reports are always "recent"
    #[must_use]
    pub const fn with_recent_crash(mut self, recent: bool) -> Self {
        self.recent_crash = recent;
        self
    }

    /// Emit a crash signature into the log stream after `n` gestures
    #[must_use]
    pub const fn with_crash_after_gestures(mut self, n: u32) -> Self {
        self.crash_after_gestures = Some(n);
        self
    }

    /// Follow-up crash line logged when the crashed app is terminated
    #[must_use]
    pub fn with_crash_log_tail(mut self, line: impl Into<String>) -> Self {
        self.crash_log_tail = Some(line.into());
        self
    }

    /// Builds numbered `n` and later fail (1-based)
    #[must_use]
    pub const fn with_build_failure_from(mut self, n: u32) -> Self {
        self.fail_build_from = Some(n);
        self
    }

    /// Installs fail
    #[must_use]
    pub const fn with_install_failure(mut self) -> Self {
        self.fail_install = true;
        self
    }

    /// Launches after the first `n` succeed fail
    #[must_use]
    pub const fn with_launch_failure_after(mut self, n: u32) -> Self {
        self.fail_launch_after = Some(n);
        self
    }

    /// Every tap and swipe fails
    #[must_use]
    pub const fn with_gesture_failure(mut self) -> Self {
        self.fail_gestures = true;
        self
    }

    /// Screenshots fail
    #[must_use]
    pub const fn with_screenshot_failure(mut self) -> Self {
        self.fail_screenshot = true;
        self
    }

    /// Bundle id reported for built apps
    #[must_use]
    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = bundle_id.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    /// Every call made so far, e.g. `"launch:MOCK-UDID-1:com.example.mock"`
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls starting with `prefix`
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Whether any call starts with `prefix`
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.call_count(prefix) > 0
    }

    /// Number of launches so far
    #[must_use]
    pub fn launches(&self) -> u32 {
        self.lock().launches
    }

    fn gesture(&self, call: String) -> SimhuntResult<()> {
        let mut state = self.lock();
        state.calls.push(call);
        if self.fail_gestures {
            return Err(SimhuntError::device("gesture rejected by mock"));
        }
        state.gestures += 1;
        let due = self
            .crash_after_gestures
            .is_some_and(|n| state.gestures >= n && !state.crash_emitted);
        if due {
            state.crash_emitted = true;
            if let Some(sender) = &state.log_sender {
                let _ = sender.send(LogEntry::now("Mock", self.crash_log_line.clone()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BuildDriver for MockSimulator {
    async fn build(&self, request: &BuildRequest) -> SimhuntResult<BuildOutput> {
        let number = {
            let mut state = self.lock();
            state.builds += 1;
            state
                .calls
                .push(format!("build:{}:{}", request.scheme, request.destination));
            state.builds
        };
        if self.fail_build_from.is_some_and(|n| number >= n) {
            return Ok(BuildOutput {
                success: false,
                app_path: None,
                warnings: Vec::new(),
                errors: vec![
                    "ContentView.swift:12:5: error: cannot find 'foo' in scope".to_string(),
                ],
                error: Some("Compilation failed".to_string()),
            });
        }
        Ok(BuildOutput {
            success: true,
            app_path: Some(self.app_path.clone()),
            warnings: vec!["deprecated API usage".to_string()],
            errors: Vec::new(),
            error: None,
        })
    }

    async fn bundle_id_for(&self, app_path: &Path) -> SimhuntResult<String> {
        self.record(format!("bundle_id:{}", app_path.display()));
        Ok(self.bundle_id.clone())
    }
}

#[async_trait]
impl DeviceControl for MockSimulator {
    async fn list_devices(&self) -> SimhuntResult<Vec<Simulator>> {
        let mut state = self.lock();
        state.calls.push("list_devices".to_string());
        Ok(state.devices.clone())
    }

    async fn booted_devices(&self) -> SimhuntResult<Vec<Simulator>> {
        let mut state = self.lock();
        state.calls.push("booted_devices".to_string());
        Ok(state.devices.iter().filter(|d| d.is_booted()).cloned().collect())
    }

    async fn boot_device(&self, udid: &str) -> SimhuntResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("boot:{udid}"));
        match state.devices.iter_mut().find(|d| d.udid == udid) {
            Some(device) => {
                device.state = SimulatorState::Booted;
                Ok(())
            }
            None => Err(SimhuntError::device(format!("unknown device {udid}"))),
        }
    }

    async fn install_app(&self, udid: &str, app_path: &Path) -> SimhuntResult<()> {
        self.record(format!("install:{udid}:{}", app_path.display()));
        if self.fail_install {
            return Err(SimhuntError::Install {
                app_path: app_path.display().to_string(),
                message: "mock install failure".to_string(),
            });
        }
        Ok(())
    }

    async fn launch_app(&self, udid: &str, bundle_id: &str) -> SimhuntResult<()> {
        let launch_number = {
            let mut state = self.lock();
            state.calls.push(format!("launch:{udid}:{bundle_id}"));
            state.launches += 1;
            state.launches
        };
        // odd launches are cold, even ones warm: one cold/warm pair per timing run
        let cold = launch_number % 2 == 1;
        if self.fail_launch_after.is_some_and(|n| launch_number > n) {
            return Err(SimhuntError::Launch {
                bundle_id: bundle_id.to_string(),
                message: "mock launch failure".to_string(),
            });
        }
        let latency = if cold {
            self.cold_launch_latency
        } else {
            self.warm_launch_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    async fn terminate_app(&self, udid: &str, bundle_id: &str) -> SimhuntResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("terminate:{udid}:{bundle_id}"));
        if state.crash_emitted && !state.tail_emitted {
            if let (Some(tail), Some(sender)) = (&self.crash_log_tail, &state.log_sender) {
                let _ = sender.send(LogEntry::now("Mock", tail.clone()));
                state.tail_emitted = true;
            }
        }
        Ok(())
    }

    async fn tap(&self, udid: &str, at: Point) -> SimhuntResult<()> {
        self.gesture(format!("tap:{udid}:{at}"))
    }

    async fn swipe(
        &self,
        udid: &str,
        from: Point,
        to: Point,
        duration_ms: u64,
    ) -> SimhuntResult<()> {
        self.gesture(format!("swipe:{udid}:{from}->{to}:{duration_ms}"))
    }
}

#[async_trait]
impl UiInspector for MockSimulator {
    async fn inspect_ui(&self, udid: &str, bundle_id: &str) -> SimhuntResult<UiElement> {
        self.record(format!("inspect:{udid}:{bundle_id}"));
        self.ui_tree.clone().ok_or_else(|| SimhuntError::Inspection {
            message: "accessibility tree unavailable".to_string(),
        })
    }
}

#[async_trait]
impl LogSource for MockSimulator {
    async fn stream_log(&self, udid: &str, predicate: &str) -> SimhuntResult<LogStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.calls.push(format!("stream_log:{udid}:{predicate}"));
        state.log_sender = Some(tx);
        Ok(LogStream::new(rx))
    }

    async fn has_recent_crashes(
        &self,
        udid: &str,
        bundle_id: &str,
        _since: DateTime<Utc>,
    ) -> SimhuntResult<bool> {
        self.record(format!("has_recent_crashes:{udid}:{bundle_id}"));
        Ok(self.recent_crash)
    }

    async fn crash_logs(
        &self,
        udid: &str,
        bundle_id: &str,
        _since: DateTime<Utc>,
        limit: usize,
    ) -> SimhuntResult<Vec<CrashReport>> {
        self.record(format!("crash_logs:{udid}:{bundle_id}:{limit}"));
        let crashed = self.recent_crash || self.lock().crash_emitted;
        if !crashed || limit == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![CrashReport {
            process: bundle_id.to_string(),
            timestamp: Utc::now(),
            exception_type: Some("EXC_BAD_ACCESS".to_string()),
            signal: Some("SIGSEGV".to_string()),
            summary: "Thread 0 Crashed: 0 Mock 0x0000000100004000 main + 64".to_string(),
        }])
    }
}

#[async_trait]
impl ScreenCapture for MockSimulator {
    async fn screenshot(&self, udid: &str, output: &Path) -> SimhuntResult<()> {
        self.record(format!("screenshot:{udid}"));
        if self.fail_screenshot {
            return Err(SimhuntError::Capture {
                message: "mock screenshot failure".to_string(),
            });
        }
        // PNG signature is enough for downstream tooling to sniff the type
        tokio::fs::write(output, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).await?;
        Ok(())
    }
}
