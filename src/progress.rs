//! Non-blocking progress event bus (spec §4.6).
//!
//! Distinct from `tracing` diagnostics: this is the caller-facing progress
//! protocol. A slow or absent listener must never stall a pipeline stage,
//! so publishing never blocks and never buffers unboundedly — a full
//! channel simply drops the event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle status of a progress step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet started.
    Pending,
    /// Currently running.
    Active,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

/// One progress event, as described in spec.md §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Which pipeline stage this event is about (`"query_planner"`,
    /// `"dispatcher"`, `"selector"`, `"extractor"`, `"analyzer"`).
    pub stage_id: String,
    /// A short step name within the stage (e.g. a country code, a batch
    /// index, or an analyzer stage number).
    pub step: String,
    /// Current status of this step.
    pub status: StepStatus,
    /// Human-readable message.
    pub message: String,
    /// Optional completion percentage in `[0, 100]`.
    pub percent: Option<u8>,
}

/// Bounded capacity for the progress channel. Deliberately small: the
/// bus exists to keep a UI current, not to replay history.
const CHANNEL_CAPACITY: usize = 64;

/// Single-writer-many-readers progress publisher.
///
/// Cloning a `ProgressBus` shares the same underlying channel (it is
/// backed by an `mpsc::Sender`, which is `Clone`), but the pipeline uses
/// exactly one producer per run, per spec.md §4.6's "single producer"
/// guarantee — clones exist so each concurrently-running stage task can
/// hold its own handle without a `Mutex`.
#[derive(Clone)]
pub struct ProgressBus {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ProgressBus {
    /// Creates a new bus and returns both the publisher handle and the
    /// receiver a caller listens on.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Publishes an event. Never blocks; if the channel is full or the
    /// receiver has been dropped, the event is silently dropped.
    pub fn publish(&self, event: ProgressEvent) {
        if let Err(err) = self.sender.try_send(event) {
            tracing::debug!(error = %err, "progress event dropped");
        }
    }

    /// Convenience for publishing a simple status update.
    pub fn emit(&self, stage_id: &str, step: &str, status: StepStatus, message: impl Into<String>) {
        self.publish(ProgressEvent {
            stage_id: stage_id.to_string(),
            step: step.to_string(),
            status,
            message: message.into(),
            percent: None,
        });
    }

    /// Convenience for publishing a status update with a percentage.
    pub fn emit_pct(
        &self,
        stage_id: &str,
        step: &str,
        status: StepStatus,
        message: impl Into<String>,
        percent: u8,
    ) {
        self.publish(ProgressEvent {
            stage_id: stage_id.to_string(),
            step: step.to_string(),
            status,
            message: message.into(),
            percent: Some(percent),
        });
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new().0
    }
}

/// A bus that never has a live receiver; `publish` is always a no-op
/// drop. Used by callers that don't want progress reporting.
#[must_use]
pub fn null_bus() -> ProgressBus {
    let (bus, receiver) = ProgressBus::new();
    drop(receiver);
    bus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_is_received_in_order() {
        let (bus, mut rx) = ProgressBus::new();
        bus.emit("dispatcher", "us", StepStatus::Active, "searching");
        bus.emit("dispatcher", "us", StepStatus::Completed, "done");

        let first = rx.recv().await.unwrap_or_else(|| unreachable!());
        let second = rx.recv().await.unwrap_or_else(|| unreachable!());
        assert_eq!(first.status, StepStatus::Active);
        assert_eq!(second.status, StepStatus::Completed);
    }

    #[test]
    fn publish_without_receiver_does_not_panic() {
        let bus = null_bus();
        bus.emit("selector", "dedupe", StepStatus::Active, "running");
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (bus, mut rx) = ProgressBus::new();
        for i in 0..(CHANNEL_CAPACITY + 10) {
            bus.emit("extractor", &i.to_string(), StepStatus::Active, "batch");
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert!(received <= CHANNEL_CAPACITY);
    }
}
