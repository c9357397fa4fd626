//! Run progress events.
//!
//! The orchestrator publishes [`PipelineEvent`]s on a
//! [`tokio::sync::broadcast`] channel. The CLI subscribes to narrate progress
//! on the console; tests subscribe to assert on ordering.

use cadence_types::{PipelineStatus, StepStatus};
use serde::{Deserialize, Serialize};

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Running,
    Aborting,
    Finalizing,
    Finished,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Running => "RUNNING",
            RunPhase::Aborting => "ABORTING",
            RunPhase::Finalizing => "FINALIZING",
            RunPhase::Finished => "FINISHED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineStarted {
        project: String,
        run_id: String,
        step_count: usize,
    },
    PhaseChanged {
        phase: RunPhase,
    },
    StepStarted {
        step: String,
        index: usize,
    },
    StepCompleted {
        step: String,
        status: StepStatus,
        duration_ms: u64,
        summary: String,
    },
    PipelineAborted {
        step: String,
        reason: String,
    },
    QualityGateEvaluated {
        passed: bool,
        violations: Vec<String>,
    },
    ReportWritten {
        format: String,
        path: String,
    },
    ReportFailed {
        format: String,
        error: String,
    },
    PipelineFinished {
        status: PipelineStatus,
        build_time_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers. Dropped when nobody listens.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(PipelineEvent::PhaseChanged {
            phase: RunPhase::Running,
        });
        emitter.emit(PipelineEvent::StepStarted {
            step: "Lint".into(),
            index: 3,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            PipelineEvent::PhaseChanged {
                phase: RunPhase::Running
            }
        );
        match rx.recv().await.unwrap() {
            PipelineEvent::StepStarted { step, index } => {
                assert_eq!(step, "Lint");
                assert_eq!(index, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::default();
        emitter.emit(PipelineEvent::PipelineAborted {
            step: "Dependency installation".into(),
            reason: "timeout".into(),
        });
    }

    #[test]
    fn statuses_serialize_uppercase() {
        let event = PipelineEvent::StepCompleted {
            step: "Security audit".into(),
            status: StepStatus::Warning,
            duration_ms: 40,
            summary: "3 vulnerabilities (exit code 1)".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["StepCompleted"]["status"], "WARNING");
        assert_eq!(RunPhase::Finalizing.as_str(), "FINALIZING");
    }
}
