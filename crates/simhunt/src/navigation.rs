//! Scripted navigation: named flows made of simple UI steps.

use crate::action::{Direction, ScreenSize};
use crate::driver::{DeviceControl, Point, UiInspector};
use crate::result::{SimhuntError, SimhuntResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One scripted UI step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavigationStep {
    /// Tap the element with this identifier (or label)
    TapElement {
        /// Identifier or label
        identifier: String,
    },
    /// Tap a point
    TapPoint {
        /// X in points
        x: f64,
        /// Y in points
        y: f64,
    },
    /// Scroll or swipe across the screen
    Swipe {
        /// Direction
        direction: Direction,
    },
    /// Pause
    Wait {
        /// Milliseconds
        ms: u64,
    },
}

impl fmt::Display for NavigationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TapElement { identifier } => write!(f, "tap '{identifier}'"),
            Self::TapPoint { x, y } => write!(f, "tap {}", Point::new(*x, *y)),
            Self::Swipe { direction } => write!(f, "swipe {direction:?}"),
            Self::Wait { ms } => write!(f, "wait {ms}ms"),
        }
    }
}

/// A named sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Flow name, used in reports
    pub name: String,
    /// Steps in order
    #[serde(default)]
    pub steps: Vec<NavigationStep>,
}

impl Flow {
    /// Create a flow
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<NavigationStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// A flow with no steps; the app just sits on screen
    #[must_use]
    pub fn idle() -> Self {
        Self::new("idle", Vec::new())
    }
}

/// Runs navigation steps against a device
#[derive(Clone, Copy)]
pub struct Navigator<'a> {
    device: &'a dyn DeviceControl,
    inspector: &'a dyn UiInspector,
    udid: &'a str,
    bundle_id: &'a str,
    screen: ScreenSize,
    gesture_duration_ms: u64,
}

impl fmt::Debug for Navigator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("udid", &self.udid)
            .field("bundle_id", &self.bundle_id)
            .finish_non_exhaustive()
    }
}

impl<'a> Navigator<'a> {
    /// Create a navigator for one app on one device
    #[must_use]
    pub fn new(
        device: &'a dyn DeviceControl,
        inspector: &'a dyn UiInspector,
        udid: &'a str,
        bundle_id: &'a str,
    ) -> Self {
        Self {
            device,
            inspector,
            udid,
            bundle_id,
            screen: ScreenSize::default(),
            gesture_duration_ms: 300,
        }
    }

    /// Screen geometry used for swipes
    #[must_use]
    pub const fn with_screen(mut self, screen: ScreenSize) -> Self {
        self.screen = screen;
        self
    }

    /// Execute one step
    pub async fn step(&self, step: &NavigationStep) -> SimhuntResult<()> {
        match step {
            NavigationStep::TapElement { identifier } => {
                let tree = self.inspector.inspect_ui(self.udid, self.bundle_id).await?;
                let element = tree.find_visible(identifier).ok_or_else(|| {
                    SimhuntError::Inspection {
                        message: format!("element '{identifier}' not found"),
                    }
                })?;
                self.device.tap(self.udid, element.frame.center()).await
            }
            NavigationStep::TapPoint { x, y } => {
                self.device.tap(self.udid, Point::new(*x, *y)).await
            }
            NavigationStep::Swipe { direction } => {
                let (from, to) = self.screen.gesture(*direction);
                self.device
                    .swipe(self.udid, from, to, self.gesture_duration_ms)
                    .await
            }
            NavigationStep::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
        }
    }

    /// Execute steps in order, stopping at the first failure
    pub async fn run(&self, steps: &[NavigationStep]) -> Result<(), String> {
        for (i, step) in steps.iter().enumerate() {
            if let Err(e) = self.step(step).await {
                tracing::debug!(step = %step, error = %e, "navigation step failed");
                return Err(format!("step {} ({step}) failed: {e}", i + 1));
            }
        }
        Ok(())
    }
}
