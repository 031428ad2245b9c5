//! Pomodoro session lifecycle (spec §4.10): session/phase state machine,
//! retry budget, force settlement, orphan recovery.

mod manager;
mod session;
mod work_phase;

pub use manager::{BatchProcessingHandle, PomodoroManager, PomodoroRuntime};
pub use session::{LlmEvaluation, PomodoroPhase, PomodoroSession, PomodoroStatus, ProcessingStatus};
pub use work_phase::{WorkPhase, WorkPhaseFailureKind, WorkPhaseStatus};

/// Minimum elapsed time for a manually-ended session to be treated as
/// real work rather than a false start (spec §4.10, §8 boundary case).
pub const MIN_SESSION_DURATION_MINUTES: i64 = 2;

/// Attempts budget for phase aggregation: one initial attempt plus
/// `MAX_RETRIES` retries (spec §4.10).
pub const MAX_RETRIES: u32 = 1;

/// Delay before a failed phase aggregation is retried (spec §4.10).
pub const RETRY_DELAY_SECONDS: u64 = 10;

/// Poll budget for the session-level LLM focus evaluation (spec §4.10).
pub const MAX_PHASE_WAIT_SECONDS: u64 = 300;

/// Hard ceiling on the whole post-session background pipeline (spec §4.10).
pub const TOTAL_PROCESSING_TIMEOUT_SECONDS: u64 = 600;
