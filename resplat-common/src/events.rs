//! Event types for the resplat pipeline
//!
//! Provides the shared `PipelineStage` enum, the `PipelineEvent`
//! notification enum, and the `EventBus` that the orchestrator and
//! asset store publish on. The presentation layer subscribes to the
//! bus instead of reaching into shared mutable state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pipeline stage state machine
///
/// Exactly one stage is active at a time. Transitions are forward on
/// success; failure demotes a stage to its designated fallback
/// (`Idle` for generation, `Viewing3D` for capture/enhancement).
/// Only `Idle` and `Result` are reachable from a reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Waiting for an upload
    #[default]
    Idle,
    /// User confirmed an upload; generation is about to be submitted
    Uploading,
    /// Remote 3D-generation job submitted and polling
    GeneratingAsset,
    /// Generated asset installed; live 3D view is interactive
    #[serde(rename = "viewing_3d")]
    Viewing3D,
    /// Frame capture armed, waiting for the next rendered frame
    Capturing,
    /// Enhancement request in flight
    Enhancing,
    /// Terminal: enhanced result available
    Result,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Uploading => "uploading",
            PipelineStage::GeneratingAsset => "generating_asset",
            PipelineStage::Viewing3D => "viewing_3d",
            PipelineStage::Capturing => "capturing",
            PipelineStage::Enhancing => "enhancing",
            PipelineStage::Result => "result",
        };
        write!(f, "{}", name)
    }
}

/// Which artifact an `AssetStored` event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    SourceImage,
    GeneratedAsset,
    CapturedView,
    EnhancedResult,
}

/// resplat pipeline event types
///
/// Events are broadcast via `EventBus`; subscribers are the
/// presentation layer and integration tests. Every store mutation and
/// orchestrator transition emits exactly one event so an observer can
/// reconstruct the session without polling shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Pipeline stage changed
    StageChanged {
        /// Stage before the transition
        old_stage: PipelineStage,
        /// Stage after the transition
        new_stage: PipelineStage,
        /// When the transition happened
        timestamp: DateTime<Utc>,
    },

    /// Remote generation job accepted by the backend
    JobSubmitted {
        /// Backend-assigned job identifier
        job_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One polling attempt completed (observable side effect only;
    /// carries the raw backend status string and the 1-based attempt)
    JobProgress {
        job_id: String,
        status: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline artifact was stored or replaced
    AssetStored {
        kind: AssetKind,
        timestamp: DateTime<Utc>,
    },

    /// A user-facing error message was published
    ErrorRaised {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The session was reset to its initial state
    PipelineReset { timestamp: DateTime<Utc> },
}

/// Central event distribution bus for pipeline events
///
/// Wraps `tokio::sync::broadcast`, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber
    /// exists, `Err` otherwise.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Used for progress updates and other events where it is
    /// acceptable that nobody is currently watching.
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_names() {
        assert_eq!(PipelineStage::Idle.to_string(), "idle");
        assert_eq!(PipelineStage::GeneratingAsset.to_string(), "generating_asset");
        assert_eq!(PipelineStage::Viewing3D.to_string(), "viewing_3d");
        assert_eq!(PipelineStage::Result.to_string(), "result");
    }

    #[test]
    fn test_stage_serde_round_trip() {
        let json = serde_json::to_string(&PipelineStage::Capturing).unwrap();
        assert_eq!(json, "\"capturing\"");
        let stage: PipelineStage = serde_json::from_str(&json).unwrap();
        assert_eq!(stage, PipelineStage::Capturing);
    }

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(PipelineEvent::JobSubmitted {
            job_id: "job-1".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            PipelineEvent::JobSubmitted { job_id, .. } => assert_eq!(job_id, "job-1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_lossy_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(PipelineEvent::PipelineReset {
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(4);
        let result = bus.emit(PipelineEvent::PipelineReset {
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }
}
