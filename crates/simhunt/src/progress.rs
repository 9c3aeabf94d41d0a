//! Ordered progress events for a running playbook.
//!
//! A run owns a [`ProgressSender`]; the caller keeps the matching
//! [`ProgressReceiver`] and drains it at its own pace. Sending never blocks
//! and never fails the run, even when the receiver is gone.

use crate::action::RecordedAction;
use crate::crash::CrashDetection;
use crate::performance::{FlowMeasurement, PerformanceRegression};
use crate::playbook::controller::{Phase, TerminationReason};
use crate::verify::AssertionOutcome;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Counters published after every unit of work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Iterations (or hunt actions) started so far
    pub iteration: u32,
    /// Equals the length of the recorded action log
    pub actions_performed: u32,
    /// Crashes recorded so far
    pub crashes_found: u32,
    /// Milliseconds since the run started
    pub elapsed_ms: u64,
}

/// One progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Run entered a new phase
    PhaseChanged {
        /// Playbook name
        playbook: String,
        /// New phase
        phase: Phase,
        /// Human-readable detail
        message: String,
    },
    /// A loop iteration started
    IterationStarted {
        /// 1-based iteration number
        iteration: u32,
    },
    /// A hunt action was recorded
    Action(RecordedAction),
    /// A crash was recorded
    Crash(CrashDetection),
    /// Navigation depth was reset by relaunching
    DepthReset {
        /// Depth before the reset
        from_depth: u32,
    },
    /// One cold/warm launch pair finished
    LaunchMeasured {
        /// 1-based run number
        run: u32,
        /// Cold launch time, if the launch succeeded
        cold_ms: Option<f64>,
        /// Warm launch time, if the launch succeeded
        warm_ms: Option<f64>,
    },
    /// A flow finished measuring
    FlowMeasured(FlowMeasurement),
    /// A metric regressed against the baseline
    Regression(PerformanceRegression),
    /// One assertion was evaluated
    AssertionChecked {
        /// Iteration the check belongs to
        iteration: u32,
        /// Outcome
        outcome: AssertionOutcome,
    },
    /// Counter update
    Progress(ProgressSnapshot),
    /// Run finished
    Finished {
        /// Why the run stopped
        termination_reason: TerminationReason,
    },
}

/// Sending half; `Default` is a disconnected sender that drops events
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    inner: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    /// Sender that discards everything
    #[must_use]
    pub const fn disconnected() -> Self {
        Self { inner: None }
    }

    /// Publish an event; a closed receiver is ignored
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.inner {
            if tx.send(event).is_err() {
                tracing::trace!("progress receiver dropped");
            }
        }
    }

    /// Whether anyone is listening
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Receiving half
#[derive(Debug)]
pub struct ProgressReceiver {
    inner: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Wait for the next event; `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.inner.recv().await
    }

    /// Take everything buffered so far without waiting
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a connected sender/receiver pair
#[must_use]
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender { inner: Some(tx) },
        ProgressReceiver { inner: rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (tx, mut rx) = channel();
        for i in 1..=5 {
            tx.emit(ProgressEvent::IterationStarted { iteration: i });
        }
        let events = rx.drain();
        let numbers: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::IterationStarted { iteration } => Some(*iteration),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_dropped_receiver_is_tolerated() {
        let (tx, rx) = channel();
        assert!(tx.is_connected());
        drop(rx);
        assert!(!tx.is_connected());
        tx.emit(ProgressEvent::IterationStarted { iteration: 1 });
    }

    #[test]
    fn test_default_sender_is_disconnected() {
        let tx = ProgressSender::default();
        assert!(!tx.is_connected());
        tx.emit(ProgressEvent::Finished {
            termination_reason: TerminationReason::DryRun,
        });
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = ProgressEvent::Progress(ProgressSnapshot {
            iteration: 2,
            actions_performed: 2,
            crashes_found: 0,
            elapsed_ms: 40,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"progress\""));
        assert!(json.contains("\"actions_performed\":2"));
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_drop() {
        let (tx, mut rx) = channel();
        let clone = tx.clone();
        clone.emit(ProgressEvent::DepthReset { from_depth: 3 });
        drop(tx);
        drop(clone);
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::DepthReset { from_depth: 3 })
        );
        assert_eq!(rx.recv().await, None);
    }
}
