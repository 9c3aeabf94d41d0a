//! Random UI interaction for crash hunting.
//!
//! Each call to [`ActionExecutor::perform`] picks one action kind by weight,
//! resolves a target (live accessibility tree when available, random screen
//! coordinate otherwise), drives the device, and returns a fully populated
//! [`RecordedAction`]. Device failures are stored on the action; they never
//! abort the hunt.

use crate::driver::{DeviceControl, Frame, Point, UiElement, UiInspector};
use crate::rng::SeededRng;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Element types worth tapping (matched case-insensitively)
pub const INTERACTABLE_TYPES: &[&str] = &[
    "button",
    "cell",
    "link",
    "image",
    "switch",
    "slider",
    "textfield",
    "securetextfield",
    "searchfield",
];

/// Kind of UI interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Tap an element or point
    Tap,
    /// Vertical swipe
    Scroll,
    /// Horizontal swipe
    Swipe,
    /// Edge swipe back
    Back,
}

impl ActionKind {
    /// All kinds, in weight order
    pub const ALL: [Self; 4] = [Self::Tap, Self::Scroll, Self::Swipe, Self::Back];

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::Scroll => "scroll",
            Self::Swipe => "swipe",
            Self::Back => "back",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gesture direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Finger moves up (content scrolls down)
    Up,
    /// Finger moves down
    Down,
    /// Finger moves left
    Left,
    /// Finger moves right
    Right,
}

/// Relative weights of each action kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionWeights {
    /// Tap weight
    pub tap: f64,
    /// Scroll weight
    pub scroll: f64,
    /// Swipe weight
    pub swipe: f64,
    /// Back weight
    pub back: f64,
}

impl Default for ActionWeights {
    fn default() -> Self {
        Self {
            tap: 60.0,
            scroll: 20.0,
            swipe: 10.0,
            back: 10.0,
        }
    }
}

impl ActionWeights {
    /// Weights in [`ActionKind::ALL`] order
    #[must_use]
    pub const fn as_array(&self) -> [f64; 4] {
        [self.tap, self.scroll, self.swipe, self.back]
    }

    /// Check weights are usable: finite, non-negative, positive sum
    pub fn validate(&self) -> Result<(), String> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("action weights must be finite and non-negative".to_string());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("at least one action weight must be positive".to_string());
        }
        Ok(())
    }
}

/// Logical screen size in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 393.0,
            height: 852.0,
        }
    }
}

impl ScreenSize {
    /// Point at fractions of the screen
    #[must_use]
    pub fn at(&self, fx: f64, fy: f64) -> Point {
        Point::new(self.width * fx, self.height * fy)
    }

    /// Start and end points of a scroll (up/down) or swipe (left/right)
    #[must_use]
    pub fn gesture(&self, direction: Direction) -> (Point, Point) {
        match direction {
            Direction::Up => (self.at(0.5, 0.7), self.at(0.5, 0.3)),
            Direction::Down => (self.at(0.5, 0.3), self.at(0.5, 0.7)),
            Direction::Left => (self.at(0.8, 0.5), self.at(0.2, 0.5)),
            Direction::Right => (self.at(0.2, 0.5), self.at(0.8, 0.5)),
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Action weights
    pub weights: ActionWeights,
    /// Screen size used for fallback taps and gestures
    pub screen: ScreenSize,
    /// Identifiers or labels never tapped
    pub excluded_elements: Vec<String>,
    /// Gesture duration
    pub gesture_duration_ms: u64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            weights: ActionWeights::default(),
            screen: ScreenSize::default(),
            excluded_elements: Vec::new(),
            gesture_duration_ms: 300,
        }
    }
}

/// The element an action resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTarget {
    /// Element type
    pub element_type: String,
    /// Accessibility identifier
    pub identifier: Option<String>,
    /// Accessibility label
    pub label: Option<String>,
    /// Element frame
    pub frame: Frame,
}

impl ActionTarget {
    fn from_element(element: &UiElement) -> Self {
        Self {
            element_type: element.element_type.clone(),
            identifier: element.identifier.clone(),
            label: element.label.clone(),
            frame: element.frame,
        }
    }
}

/// One performed UI interaction; immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAction {
    /// 1-based, gap-free within a run
    pub action_number: u32,
    /// When the action was performed
    pub timestamp: DateTime<Utc>,
    /// Action kind
    pub kind: ActionKind,
    /// Resolved element, for element taps
    pub target: Option<ActionTarget>,
    /// Tap point or gesture start
    pub coordinates: Option<Point>,
    /// Gesture end
    pub end_coordinates: Option<Point>,
    /// Gesture direction
    pub direction: Option<Direction>,
    /// Tap fell back to a random coordinate
    pub fallback: bool,
    /// Whether the device accepted the action
    pub success: bool,
    /// Failure detail
    pub error: Option<String>,
    /// Navigation depth after this action
    pub depth_after_action: u32,
}

impl RecordedAction {
    pub(crate) fn new(action_number: u32, kind: ActionKind, depth: u32) -> Self {
        Self {
            action_number,
            timestamp: Utc::now(),
            kind,
            target: None,
            coordinates: None,
            end_coordinates: None,
            direction: None,
            fallback: false,
            success: false,
            error: None,
            depth_after_action: depth,
        }
    }

    /// One-line human description, used in reproduction scripts
    #[must_use]
    pub fn describe(&self) -> String {
        let what = match (&self.kind, &self.target, &self.direction) {
            (ActionKind::Tap, Some(target), _) => {
                let name = target
                    .identifier
                    .as_deref()
                    .or(target.label.as_deref())
                    .unwrap_or("<unnamed>");
                format!("Tap {} '{}'", target.element_type, name)
            }
            (ActionKind::Tap, None, _) if self.fallback => "Tap random point".to_string(),
            (ActionKind::Tap, None, _) => "Tap (no target)".to_string(),
            (ActionKind::Scroll, _, Some(dir)) => format!("Scroll {dir:?}").to_lowercase(),
            (ActionKind::Swipe, _, Some(dir)) => format!("Swipe {dir:?}").to_lowercase(),
            (ActionKind::Back, _, _) => "Swipe back from left edge".to_string(),
            (kind, _, _) => kind.to_string(),
        };
        let at = self
            .coordinates
            .map(|p| format!(" at {p}"))
            .unwrap_or_default();
        let status = if self.success {
            String::new()
        } else {
            format!(" [failed: {}]", self.error.as_deref().unwrap_or("unknown"))
        };
        format!("{}. {what}{at}{status}", self.action_number)
    }
}

/// Chooses and performs one random UI interaction
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    config: ActionConfig,
    excluded: HashSet<String>,
}

impl ActionExecutor {
    /// Create an executor
    #[must_use]
    pub fn new(config: ActionConfig) -> Self {
        let excluded = config.excluded_elements.iter().cloned().collect();
        Self { config, excluded }
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Pick an action kind by weight
    pub fn choose_kind(&self, rng: &mut SeededRng) -> ActionKind {
        rng.weighted_choice(&ActionKind::ALL, &self.config.weights.as_array())
            .copied()
            .unwrap_or(ActionKind::Tap)
    }

    /// Tap candidates in `tree` after filtering
    #[must_use]
    pub fn candidates<'t>(&self, tree: &'t UiElement) -> Vec<&'t UiElement> {
        tree.flatten()
            .into_iter()
            .filter(|e| e.enabled && e.hittable && e.visible)
            .filter(|e| is_interactable(&e.element_type))
            .filter(|e| {
                let excluded_id = e.identifier.as_ref().is_some_and(|i| self.excluded.contains(i));
                let excluded_label = e.label.as_ref().is_some_and(|l| self.excluded.contains(l));
                !excluded_id && !excluded_label
            })
            .collect()
    }

    /// Perform one action at navigation depth `depth`
    pub async fn perform(
        &self,
        device: &dyn DeviceControl,
        inspector: &dyn UiInspector,
        udid: &str,
        bundle_id: &str,
        rng: &mut SeededRng,
        action_number: u32,
        depth: u32,
    ) -> RecordedAction {
        let kind = self.choose_kind(rng);
        let mut action = RecordedAction::new(action_number, kind, depth);
        match kind {
            ActionKind::Tap => {
                self.tap(device, inspector, udid, bundle_id, rng, &mut action)
                    .await;
            }
            ActionKind::Scroll => {
                let direction = if rng.random() < 0.5 {
                    Direction::Up
                } else {
                    Direction::Down
                };
                self.gesture(device, udid, direction, &mut action).await;
            }
            ActionKind::Swipe => {
                let direction = if rng.random() < 0.5 {
                    Direction::Left
                } else {
                    Direction::Right
                };
                self.gesture(device, udid, direction, &mut action).await;
            }
            ActionKind::Back => {
                let screen = self.config.screen;
                let from = Point::new(5.0, screen.height * 0.5);
                let to = screen.at(0.7, 0.5);
                action.coordinates = Some(from);
                action.end_coordinates = Some(to);
                action.direction = Some(Direction::Right);
                match device
                    .swipe(udid, from, to, self.config.gesture_duration_ms)
                    .await
                {
                    Ok(()) => {
                        action.success = true;
                        action.depth_after_action = depth.saturating_sub(1);
                    }
                    Err(e) => action.error = Some(e.to_string()),
                }
            }
        }
        action
    }

    async fn tap(
        &self,
        device: &dyn DeviceControl,
        inspector: &dyn UiInspector,
        udid: &str,
        bundle_id: &str,
        rng: &mut SeededRng,
        action: &mut RecordedAction,
    ) {
        let point = match inspector.inspect_ui(udid, bundle_id).await {
            Ok(tree) => {
                let candidates = self.candidates(&tree);
                let Some(element) = rng.random_choice(&candidates) else {
                    action.error = Some(format!(
                        "no interactable elements on screen ({} excluded)",
                        self.excluded.len()
                    ));
                    return;
                };
                action.target = Some(ActionTarget::from_element(element));
                element.frame.center()
            }
            Err(e) => {
                tracing::debug!(error = %e, "UI tree unavailable, tapping a random point");
                action.fallback = true;
                let screen = self.config.screen;
                Point::new(rng.random() * screen.width, rng.random() * screen.height)
            }
        };

        action.coordinates = Some(point);
        match device.tap(udid, point).await {
            Ok(()) => {
                action.success = true;
                if action.target.is_some() {
                    action.depth_after_action += 1;
                }
            }
            Err(e) => action.error = Some(e.to_string()),
        }
    }

    async fn gesture(
        &self,
        device: &dyn DeviceControl,
        udid: &str,
        direction: Direction,
        action: &mut RecordedAction,
    ) {
        let (from, to) = self.config.screen.gesture(direction);
        action.coordinates = Some(from);
        action.end_coordinates = Some(to);
        action.direction = Some(direction);
        match device
            .swipe(udid, from, to, self.config.gesture_duration_ms)
            .await
        {
            Ok(()) => action.success = true,
            Err(e) => action.error = Some(e.to_string()),
        }
    }
}

fn is_interactable(element_type: &str) -> bool {
    let lowered = element_type.to_ascii_lowercase();
    INTERACTABLE_TYPES.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSimulator;

    const UDID: &str = "MOCK-UDID-1";
    const BUNDLE: &str = "com.example.mock";

    fn weights(tap: f64, scroll: f64, swipe: f64, back: f64) -> ActionConfig {
        ActionConfig {
            weights: ActionWeights {
                tap,
                scroll,
                swipe,
                back,
            },
            ..ActionConfig::default()
        }
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn test_tap_only_weights_always_tap() {
            let executor = ActionExecutor::new(weights(100.0, 0.0, 0.0, 0.0));
            let mut rng = SeededRng::new(Some(4));
            for _ in 0..60 {
                assert_eq!(executor.choose_kind(&mut rng), ActionKind::Tap);
            }
        }

        #[test]
        fn test_default_weights_produce_every_kind() {
            let executor = ActionExecutor::new(ActionConfig::default());
            let mut rng = SeededRng::new(Some(2024));
            let kinds: HashSet<ActionKind> =
                (0..500).map(|_| executor.choose_kind(&mut rng)).collect();
            assert_eq!(kinds.len(), 4);
        }

        #[test]
        fn test_weights_validation() {
            assert!(ActionWeights::default().validate().is_ok());
            let zero = ActionWeights {
                tap: 0.0,
                scroll: 0.0,
                swipe: 0.0,
                back: 0.0,
            };
            assert!(zero.validate().is_err());
            let negative = ActionWeights {
                tap: -1.0,
                ..ActionWeights::default()
            };
            assert!(negative.validate().is_err());
        }

        #[test]
        fn test_candidates_filter_disabled_static_and_excluded() {
            let mut config = ActionConfig::default();
            config.excluded_elements = vec!["settings".to_string()];
            let executor = ActionExecutor::new(config);
            let tree = MockSimulator::sample_ui_tree();
            let ids: Vec<_> = executor
                .candidates(&tree)
                .iter()
                .filter_map(|e| e.identifier.clone())
                .collect();
            assert_eq!(ids, vec!["login".to_string(), "row-0".to_string()]);
        }
    }

    mod perform_tests {
        use super::*;

        #[tokio::test]
        async fn test_tap_hits_element_center_and_deepens() {
            let sim = MockSimulator::new();
            let executor = ActionExecutor::new(weights(1.0, 0.0, 0.0, 0.0));
            let mut rng = SeededRng::new(Some(8));
            let action = executor
                .perform(&sim, &sim, UDID, BUNDLE, &mut rng, 1, 0)
                .await;
            assert!(action.success);
            assert!(!action.fallback);
            let target = action.target.clone().unwrap();
            assert_eq!(action.coordinates, Some(target.frame.center()));
            assert_eq!(action.depth_after_action, 1);
            assert!(sim.was_called("tap:"));
        }

        #[tokio::test]
        async fn test_tap_falls_back_without_ui_tree() {
            let sim = MockSimulator::new().with_ui_tree(None);
            let executor = ActionExecutor::new(weights(1.0, 0.0, 0.0, 0.0));
            let mut rng = SeededRng::new(Some(8));
            let action = executor
                .perform(&sim, &sim, UDID, BUNDLE, &mut rng, 1, 2)
                .await;
            assert!(action.success);
            assert!(action.fallback);
            assert!(action.target.is_none());
            assert_eq!(action.depth_after_action, 2);
            let p = action.coordinates.unwrap();
            assert!(p.x >= 0.0 && p.x < 393.0 && p.y >= 0.0 && p.y < 852.0);
        }

        #[tokio::test]
        async fn test_tap_with_nothing_interactable_is_noop_failure() {
            let tree = UiElement::new("Application", Frame::new(0.0, 0.0, 393.0, 852.0))
                .with_child(UiElement::new("StaticText", Frame::new(0.0, 0.0, 10.0, 10.0)));
            let sim = MockSimulator::new().with_ui_tree(Some(tree));
            let executor = ActionExecutor::new(weights(1.0, 0.0, 0.0, 0.0));
            let mut rng = SeededRng::new(Some(8));
            let action = executor
                .perform(&sim, &sim, UDID, BUNDLE, &mut rng, 3, 1)
                .await;
            assert!(!action.success);
            assert!(action.error.unwrap().contains("no interactable elements"));
            assert!(!sim.was_called("tap:"));
        }

        #[tokio::test]
        async fn test_back_decrements_depth_floored_at_zero() {
            let sim = MockSimulator::new();
            let executor = ActionExecutor::new(weights(0.0, 0.0, 0.0, 1.0));
            let mut rng = SeededRng::new(Some(8));
            let action = executor
                .perform(&sim, &sim, UDID, BUNDLE, &mut rng, 1, 2)
                .await;
            assert_eq!(action.depth_after_action, 1);
            let action = executor
                .perform(&sim, &sim, UDID, BUNDLE, &mut rng, 2, 0)
                .await;
            assert_eq!(action.depth_after_action, 0);
        }

        #[tokio::test]
        async fn test_scroll_is_vertical_swipe() {
            let sim = MockSimulator::new();
            let executor = ActionExecutor::new(weights(0.0, 1.0, 0.0, 0.0));
            let mut rng = SeededRng::new(Some(8));
            let action = executor
                .perform(&sim, &sim, UDID, BUNDLE, &mut rng, 1, 0)
                .await;
            let (from, to) = (action.coordinates.unwrap(), action.end_coordinates.unwrap());
            assert!((from.x - to.x).abs() < f64::EPSILON);
            assert!(matches!(action.direction, Some(Direction::Up | Direction::Down)));
        }

        #[tokio::test]
        async fn test_device_failure_is_recorded_not_raised() {
            let sim = MockSimulator::new().with_gesture_failure();
            let executor = ActionExecutor::new(weights(0.0, 0.0, 1.0, 0.0));
            let mut rng = SeededRng::new(Some(8));
            let action = executor
                .perform(&sim, &sim, UDID, BUNDLE, &mut rng, 1, 0)
                .await;
            assert!(!action.success);
            assert!(action.error.as_ref().unwrap().contains("gesture rejected"));
            assert!(action.describe().contains("failed"));
        }
    }
}
