//! Event kinds emitted on the [`EventBus`] collaborator.
//!
//! Every state change the core makes visible to the outside world goes
//! through `EventBus::emit`. The GUI polls for events (or subscribes);
//! the Coordinator guarantees emission order within a session (spec §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pomodoro::WorkPhaseFailureKind;

/// Every event kind this core can emit, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    PomodoroPhaseSwitched {
        session_id: String,
        phase: crate::pomodoro::PomodoroPhase,
        round: u32,
        at: DateTime<Utc>,
    },
    PomodoroWorkPhaseCompleted {
        session_id: String,
        phase_number: u32,
        activity_count: usize,
        at: DateTime<Utc>,
    },
    PomodoroWorkPhaseFailed {
        session_id: String,
        phase_number: u32,
        error_type: WorkPhaseFailureKind,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    PomodoroProcessingProgress {
        session_id: String,
        job_id: String,
        phases_done: usize,
        phases_total: usize,
        at: DateTime<Utc>,
    },
    PomodoroProcessingComplete {
        session_id: String,
        job_id: String,
        focus_score: Option<u8>,
        at: DateTime<Utc>,
    },
    PomodoroProcessingFailed {
        session_id: String,
        job_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    PomodoroSessionDeleted {
        session_id: String,
        at: DateTime<Utc>,
    },
    EventDeleted {
        event_id: String,
        at: DateTime<Utc>,
    },
    KnowledgeCreated { id: String, at: DateTime<Utc> },
    KnowledgeUpdated { id: String, at: DateTime<Utc> },
    KnowledgeDeleted { id: String, at: DateTime<Utc> },
    TodoCreated { id: String, at: DateTime<Utc> },
    TodoUpdated { id: String, at: DateTime<Utc> },
    TodoDeleted { id: String, at: DateTime<Utc> },
}

impl Event {
    /// The stable string name used on the wire / in logs, independent of
    /// the serde tag (kept explicit so logging call sites read cleanly).
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PomodoroPhaseSwitched { .. } => "pomodoro_phase_switched",
            Event::PomodoroWorkPhaseCompleted { .. } => "pomodoro_work_phase_completed",
            Event::PomodoroWorkPhaseFailed { .. } => "pomodoro_work_phase_failed",
            Event::PomodoroProcessingProgress { .. } => "pomodoro_processing_progress",
            Event::PomodoroProcessingComplete { .. } => "pomodoro_processing_complete",
            Event::PomodoroProcessingFailed { .. } => "pomodoro_processing_failed",
            Event::PomodoroSessionDeleted { .. } => "pomodoro_session_deleted",
            Event::EventDeleted { .. } => "event_deleted",
            Event::KnowledgeCreated { .. } => "knowledge_created",
            Event::KnowledgeUpdated { .. } => "knowledge_updated",
            Event::KnowledgeDeleted { .. } => "knowledge_deleted",
            Event::TodoCreated { .. } => "todo_created",
            Event::TodoUpdated { .. } => "todo_updated",
            Event::TodoDeleted { .. } => "todo_deleted",
        }
    }
}

/// Collaborator consumed by this core to publish [`Event`]s (spec §6).
///
/// Implementations are expected to be cheap and non-blocking; the core
/// does not retry a failed emit.
pub trait EventBus: Send + Sync {
    fn emit(&self, event: Event);
}

/// An [`EventBus`] that drops everything. Useful as a default for
/// components that are constructed without an explicit bus (tests,
/// standalone tools).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn emit(&self, _event: Event) {}
}
