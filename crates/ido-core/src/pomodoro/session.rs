//! `PomodoroSession` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroPhase {
    Work,
    Break,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroStatus {
    Active,
    Completed,
    Abandoned,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Cached outcome of the session-level LLM focus evaluation (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEvaluation {
    pub summary: String,
    /// Canonical range is `[0, 100]` at the persistence boundary (spec §9).
    pub focus_score: u8,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PomodoroSession {
    pub id: String,
    pub user_intent: String,
    pub planned_duration_minutes: i64,
    pub work_duration_minutes: i64,
    pub break_duration_minutes: i64,
    pub total_rounds: u32,
    pub current_round: u32,
    pub current_phase: PomodoroPhase,
    pub completed_rounds: u32,
    pub phase_start_time: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i64>,
    pub status: PomodoroStatus,
    pub processing_status: ProcessingStatus,
    pub associated_todo_id: Option<String>,
    pub llm_evaluation: Option<LlmEvaluation>,
}

impl PomodoroSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        user_intent: String,
        work_duration_minutes: i64,
        break_duration_minutes: i64,
        total_rounds: u32,
        associated_todo_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_intent,
            planned_duration_minutes: (work_duration_minutes + break_duration_minutes)
                * total_rounds as i64,
            work_duration_minutes,
            break_duration_minutes,
            total_rounds,
            current_round: 1,
            current_phase: PomodoroPhase::Work,
            completed_rounds: 0,
            phase_start_time: now,
            start_time: now,
            end_time: None,
            actual_duration_minutes: None,
            status: PomodoroStatus::Active,
            processing_status: ProcessingStatus::Pending,
            associated_todo_id,
            llm_evaluation: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PomodoroStatus::Active
    }

    /// `completed_rounds <= total_rounds` and `status=active <=> no end_time`
    /// (spec §3, §8).
    pub fn invariants_hold(&self) -> bool {
        let rounds_ok = self.completed_rounds <= self.total_rounds;
        let active_end_ok = (self.status == PomodoroStatus::Active) == self.end_time.is_none();
        rounds_ok && active_end_ok
    }

    /// Elapsed minutes in the current work phase, as of `now`.
    pub fn elapsed_in_current_phase_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.phase_start_time).num_minutes().max(0)
    }
}
