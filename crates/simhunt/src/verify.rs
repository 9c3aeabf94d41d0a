//! UI assertions checked after each ship-loop iteration.
//!
//! An [`AssertionVerifier`] turns one [`Assertion`] into an
//! [`AssertionOutcome`]. The default [`UiTreeVerifier`] re-inspects the UI
//! tree until the condition holds or the timeout expires. A failed check is
//! an outcome, never an error.

use crate::driver::{UiElement, UiInspector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Condition on the current screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// An element with this identifier or label is present and visible
    ElementExists {
        /// Identifier or label
        identifier: String,
    },
    /// No visible element has this identifier or label
    ElementNotExists {
        /// Identifier or label
        identifier: String,
    },
    /// The element is present and enabled
    ElementEnabled {
        /// Identifier or label
        identifier: String,
    },
    /// Some visible label contains the text
    TextVisible {
        /// Text
        text: String,
    },
    /// Exactly `count` visible elements of a type
    ElementCount {
        /// Element type, compared case-insensitively
        element_type: String,
        /// Expected count
        count: usize,
    },
}

impl Assertion {
    /// Evaluate against a UI tree; `Err` carries the failure message
    pub fn evaluate(&self, tree: &UiElement) -> Result<(), String> {
        let visible = |query: &str| -> Vec<&UiElement> {
            tree.flatten()
                .into_iter()
                .filter(|e| e.visible && e.matches(query))
                .collect()
        };
        match self {
            Self::ElementExists { identifier } => {
                if visible(identifier).is_empty() {
                    Err(format!("element '{identifier}' not found"))
                } else {
                    Ok(())
                }
            }
            Self::ElementNotExists { identifier } => {
                if visible(identifier).is_empty() {
                    Ok(())
                } else {
                    Err(format!("element '{identifier}' is still visible"))
                }
            }
            Self::ElementEnabled { identifier } => {
                let found = visible(identifier);
                if found.iter().any(|e| e.enabled) {
                    Ok(())
                } else if found.is_empty() {
                    Err(format!("element '{identifier}' not found"))
                } else {
                    Err(format!("element '{identifier}' is disabled"))
                }
            }
            Self::TextVisible { text } => {
                if tree.contains_text(text) {
                    Ok(())
                } else {
                    Err(format!("text '{text}' not visible"))
                }
            }
            Self::ElementCount {
                element_type,
                count,
            } => {
                let found = tree
                    .flatten()
                    .iter()
                    .filter(|e| e.visible && e.element_type.eq_ignore_ascii_case(element_type))
                    .count();
                if found == *count {
                    Ok(())
                } else {
                    Err(format!("expected {count} {element_type} elements, found {found}"))
                }
            }
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementExists { identifier } => write!(f, "'{identifier}' exists"),
            Self::ElementNotExists { identifier } => write!(f, "'{identifier}' does not exist"),
            Self::ElementEnabled { identifier } => write!(f, "'{identifier}' is enabled"),
            Self::TextVisible { text } => write!(f, "text '{text}' is visible"),
            Self::ElementCount {
                element_type,
                count,
            } => write!(f, "{count} x {element_type}"),
        }
    }
}

/// Result of checking one assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionOutcome {
    /// Human-readable assertion
    pub description: String,
    /// Whether it held
    pub passed: bool,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Time spent polling
    pub duration_ms: u64,
}

impl AssertionOutcome {
    /// Passing outcome
    #[must_use]
    pub fn pass(assertion: &Assertion, duration_ms: u64) -> Self {
        Self {
            description: assertion.to_string(),
            passed: true,
            message: None,
            duration_ms,
        }
    }

    /// Failing outcome
    #[must_use]
    pub fn fail(assertion: &Assertion, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            description: assertion.to_string(),
            passed: false,
            message: Some(message.into()),
            duration_ms,
        }
    }
}

/// Checks assertions against a running app
#[async_trait]
pub trait AssertionVerifier: Send + Sync {
    /// Check one assertion, waiting up to `timeout` for it to hold
    async fn verify(
        &self,
        udid: &str,
        bundle_id: &str,
        assertion: &Assertion,
        timeout: Duration,
    ) -> AssertionOutcome;
}

/// Polls the UI tree until the assertion holds
#[derive(Clone)]
pub struct UiTreeVerifier {
    inspector: Arc<dyn UiInspector>,
    poll_interval: Duration,
}

impl fmt::Debug for UiTreeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiTreeVerifier")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl UiTreeVerifier {
    /// Create a verifier polling every 250ms
    #[must_use]
    pub fn new(inspector: Arc<dyn UiInspector>) -> Self {
        Self {
            inspector,
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl AssertionVerifier for UiTreeVerifier {
    async fn verify(
        &self,
        udid: &str,
        bundle_id: &str,
        assertion: &Assertion,
        timeout: Duration,
    ) -> AssertionOutcome {
        let start = Instant::now();
        let elapsed_ms = || u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        loop {
            let failure = match self.inspector.inspect_ui(udid, bundle_id).await {
                Ok(tree) => match assertion.evaluate(&tree) {
                    Ok(()) => return AssertionOutcome::pass(assertion, elapsed_ms()),
                    Err(message) => message,
                },
                Err(e) => e.to_string(),
            };
            if start.elapsed() + self.poll_interval >= timeout {
                return AssertionOutcome::fail(assertion, failure, elapsed_ms());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
