//! `PomodoroManager` — session lifecycle, phase timer, settlement, retry,
//! orphan recovery (spec §4.10).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use super::session::{PomodoroPhase, PomodoroStatus, ProcessingStatus};
use super::work_phase::{WorkPhase, WorkPhaseFailureKind, WorkPhaseStatus};
use super::{
    PomodoroSession, MAX_PHASE_WAIT_SECONDS, MAX_RETRIES, MIN_SESSION_DURATION_MINUTES,
    TOTAL_PROCESSING_TIMEOUT_SECONDS,
};
use crate::error::{PomodoroError, StoreError};
use crate::events::{Event, EventBus};
use crate::interfaces::Store;

/// Correlates background post-session work with the events it emits
/// (spec supplement: `pomodoro_manager.py::_trigger_batch_processing`
/// returns a job id the caller can track).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProcessingHandle {
    pub session_id: String,
    pub job_id: String,
}

/// The Coordinator-side capability the PomodoroManager needs without
/// owning the Coordinator (spec §9 "Cyclic ownership"): switching
/// perception mode, pausing/resuming capture, force-draining the
/// accumulator, and running phase-scoped activity aggregation.
#[async_trait]
pub trait PomodoroRuntime: Send + Sync {
    fn enter_pomodoro_mode(&self, session_id: &str);
    fn exit_pomodoro_mode(&self);
    async fn stop_perception(&self);
    async fn resume_perception(&self);

    /// Force settlement (spec glossary): immediate drain-and-extract of
    /// whatever is accumulated for `session_id` as of `now`, via the
    /// continuous-mode Sampler -> RawAgent -> ActionAgent path. Returns
    /// the number of Actions saved.
    async fn force_settlement(&self, session_id: &str, now: DateTime<Utc>) -> usize;

    /// Runs SessionAgent clustering over the Actions captured in
    /// `[phase_start, phase_end)` for `session_id`, persists the
    /// resulting Activities tagged with `phase_number`, and returns how
    /// many were saved.
    async fn aggregate_work_phase(
        &self,
        session_id: &str,
        phase_number: u32,
        phase_start: DateTime<Utc>,
        phase_end: DateTime<Utc>,
    ) -> Result<usize, crate::error::PipelineError>;

    /// Session-level LLM focus evaluation; `None` means the heuristic
    /// fallback could not be computed either (e.g. no activities).
    async fn evaluate_session_focus(&self, session_id: &str) -> Option<super::session::LlmEvaluation>;
}

pub struct PomodoroManager {
    store: Arc<dyn Store>,
    events: Arc<dyn EventBus>,
    runtime: Arc<dyn PomodoroRuntime>,
    current: Mutex<Option<PomodoroSession>>,
}

impl PomodoroManager {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventBus>, runtime: Arc<dyn PomodoroRuntime>) -> Self {
        Self {
            store,
            events,
            runtime,
            current: Mutex::new(None),
        }
    }

    pub async fn get_current_session(&self) -> Option<PomodoroSession> {
        self.current.lock().await.clone()
    }

    pub async fn get_current_session_id(&self) -> Option<String> {
        self.current.lock().await.as_ref().map(|s| s.id.clone())
    }

    /// Rejected when another session is already active (spec §4.10,
    /// §8: at most one active session at a time).
    pub async fn start_pomodoro(
        &self,
        user_intent: String,
        work_duration_minutes: i64,
        break_duration_minutes: i64,
        total_rounds: u32,
        associated_todo_id: Option<String>,
    ) -> Result<PomodoroSession, PomodoroError> {
        let mut guard = self.current.lock().await;
        if guard.as_ref().is_some_and(PomodoroSession::is_active) {
            return Err(PomodoroError::SessionAlreadyActive);
        }

        let now = Utc::now();
        let session = PomodoroSession::new(
            Uuid::new_v4().to_string(),
            user_intent,
            work_duration_minutes,
            break_duration_minutes,
            total_rounds,
            associated_todo_id,
            now,
        );

        self.store
            .save_pomodoro_session(&session)
            .await
            .map_err(|e| PomodoroError::SessionNotFound(e.to_string()))?;

        self.runtime.enter_pomodoro_mode(&session.id);
        self.events.emit(Event::PomodoroPhaseSwitched {
            session_id: session.id.clone(),
            phase: PomodoroPhase::Work,
            round: session.current_round,
            at: now,
        });

        *guard = Some(session.clone());
        Ok(session)
    }

    /// Periodic driver (mirrors the teacher's `TimerEngine::tick`):
    /// checks whether the current phase has elapsed and, if so, runs the
    /// automatic work<->break transition (spec §4.10, §4.11).
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        let due = {
            let guard = self.current.lock().await;
            match guard.as_ref() {
                Some(s) if s.is_active() => {
                    let duration_minutes = match s.current_phase {
                        PomodoroPhase::Work => s.work_duration_minutes,
                        PomodoroPhase::Break => s.break_duration_minutes,
                        PomodoroPhase::Completed => return,
                    };
                    now.signed_duration_since(s.phase_start_time).num_minutes() >= duration_minutes
                }
                _ => false,
            }
        };
        if due {
            self.auto_switch_phase(now).await;
        }
    }

    async fn auto_switch_phase(self: &Arc<Self>, now: DateTime<Utc>) {
        let (session_id, from_phase, round, settle) = {
            let guard = self.current.lock().await;
            let s = match guard.as_ref() {
                Some(s) => s,
                None => return,
            };
            (s.id.clone(), s.current_phase, s.current_round, s.current_phase == PomodoroPhase::Work)
        };

        if settle {
            let phase_start = {
                let guard = self.current.lock().await;
                guard.as_ref().map(|s| s.phase_start_time).unwrap_or(now)
            };
            self.runtime.force_settlement(&session_id, now).await;
            self.runtime.stop_perception().await;

            let manager = Arc::clone(self);
            let sid = session_id.clone();
            tokio::spawn(async move {
                manager.run_phase_aggregation(&sid, round, phase_start, now).await;
            });
        }

        let mut guard = self.current.lock().await;
        let Some(session) = guard.as_mut() else { return };
        match from_phase {
            PomodoroPhase::Work => {
                session.current_phase = PomodoroPhase::Break;
                session.phase_start_time = now;
                self.events.emit(Event::PomodoroPhaseSwitched {
                    session_id: session.id.clone(),
                    phase: PomodoroPhase::Break,
                    round: session.current_round,
                    at: now,
                });
            }
            PomodoroPhase::Break => {
                session.completed_rounds += 1;
                if session.completed_rounds >= session.total_rounds {
                    session.current_phase = PomodoroPhase::Completed;
                    session.status = PomodoroStatus::Completed;
                    session.end_time = Some(now);
                    session.processing_status = ProcessingStatus::Pending;
                    let _ = self.store.update_pomodoro_session(session).await;
                    self.runtime.exit_pomodoro_mode();

                    let manager = Arc::clone(self);
                    let sid = session.id.clone();
                    drop(guard);
                    tokio::spawn(async move {
                        manager.run_batch_processor(&sid).await;
                    });
                    return;
                }
                session.current_round += 1;
                session.current_phase = PomodoroPhase::Work;
                session.phase_start_time = now;
                self.runtime.resume_perception().await;
                self.events.emit(Event::PomodoroPhaseSwitched {
                    session_id: session.id.clone(),
                    phase: PomodoroPhase::Work,
                    round: session.current_round,
                    at: now,
                });
            }
            PomodoroPhase::Completed => {}
        }
        let _ = self.store.update_pomodoro_session(session).await;
    }

    /// Retry-budgeted phase aggregation (spec §4.10). Emits
    /// `work_phase_completed`/`work_phase_failed` and persists the
    /// WorkPhase record through every transition.
    async fn run_phase_aggregation(
        &self,
        session_id: &str,
        phase_number: u32,
        phase_start: DateTime<Utc>,
        phase_end: DateTime<Utc>,
    ) {
        let mut phase = WorkPhase::new(Uuid::new_v4().to_string(), session_id.to_string(), phase_number, phase_start);
        if self.store.save_work_phase(&phase).await.is_err() {
            warn!(session_id, phase_number, "failed to persist new work phase record");
        }

        loop {
            phase.mark_processing();
            let _ = self.store.update_work_phase(&phase).await;

            match self
                .runtime
                .aggregate_work_phase(session_id, phase_number, phase_start, phase_end)
                .await
            {
                Ok(activity_count) => {
                    let now = Utc::now();
                    phase.mark_completed(activity_count, now);
                    let _ = self.store.update_work_phase(&phase).await;
                    self.events.emit(Event::PomodoroWorkPhaseCompleted {
                        session_id: session_id.to_string(),
                        phase_number,
                        activity_count,
                        at: now,
                    });
                    return;
                }
                Err(err) => {
                    let kind = WorkPhaseFailureKind::classify(&err);
                    let exhausted = phase.mark_failed_attempt(kind, MAX_RETRIES);
                    let _ = self.store.update_work_phase(&phase).await;
                    self.events.emit(Event::PomodoroWorkPhaseFailed {
                        session_id: session_id.to_string(),
                        phase_number,
                        error_type: kind,
                        retry_count: phase.retry_count,
                        at: Utc::now(),
                    });
                    if exhausted {
                        warn!(session_id, phase_number, ?kind, "work phase aggregation exhausted its retry budget");
                        return;
                    }
                    tokio::time::sleep(std::time::Duration::from_secs(super::RETRY_DELAY_SECONDS)).await;
                }
            }
        }
    }

    /// Manual end (spec §4.10). Short sessions abandon immediately; real
    /// sessions take the fast synchronous path and return a handle while
    /// background aggregation and focus evaluation continue.
    pub async fn end_pomodoro(self: &Arc<Self>) -> Result<BatchProcessingHandle, PomodoroError> {
        let now = Utc::now();
        let mut guard = self.current.lock().await;
        let session = guard.as_mut().ok_or(PomodoroError::NoActiveSession)?;
        if !session.is_active() {
            return Err(PomodoroError::NoActiveSession);
        }

        let elapsed_total_minutes = session.completed_rounds as i64 * session.work_duration_minutes
            + match session.current_phase {
                PomodoroPhase::Work => session.elapsed_in_current_phase_minutes(now),
                _ => 0,
            };

        let session_id = session.id.clone();
        if elapsed_total_minutes < MIN_SESSION_DURATION_MINUTES {
            session.status = PomodoroStatus::Abandoned;
            session.end_time = Some(now);
            session.actual_duration_minutes = Some(elapsed_total_minutes);
            let _ = self.store.update_pomodoro_session(session).await;
            self.runtime.exit_pomodoro_mode();
            self.events.emit(Event::PomodoroProcessingComplete {
                session_id: session_id.clone(),
                job_id: String::new(),
                focus_score: None,
                at: now,
            });
            return Ok(BatchProcessingHandle { session_id, job_id: String::new() });
        }

        session.status = PomodoroStatus::Completed;
        session.end_time = Some(now);
        session.actual_duration_minutes = Some(elapsed_total_minutes);
        session.processing_status = ProcessingStatus::Pending;
        let _ = self.store.update_pomodoro_session(session).await;
        self.runtime.exit_pomodoro_mode();
        drop(guard);

        let job_id = Uuid::new_v4().to_string();
        let manager = Arc::clone(self);
        let sid = session_id.clone();
        let jid = job_id.clone();
        tokio::spawn(async move {
            manager.run_batch_processor_with_job(&sid, &jid).await;
        });

        Ok(BatchProcessingHandle { session_id, job_id })
    }

    async fn run_batch_processor(self: &Arc<Self>, session_id: &str) {
        self.run_batch_processor_with_job(session_id, &Uuid::new_v4().to_string()).await;
    }

    /// Background path (spec §4.10 step 2): re-aggregates any work
    /// phase without a terminal record, force-settles once more, then
    /// waits on everything before scheduling the focus evaluation.
    /// Bounded by `TOTAL_PROCESSING_TIMEOUT_SECONDS`.
    async fn run_batch_processor_with_job(self: &Arc<Self>, session_id: &str, job_id: &str) {
        let work = async {
            let existing = self.store.get_work_phases(session_id).await.unwrap_or_default();
            let done: std::collections::HashSet<u32> = existing
                .iter()
                .filter(|p| matches!(p.status, WorkPhaseStatus::Completed | WorkPhaseStatus::Processing))
                .map(|p| p.phase_number)
                .collect();

            let total_rounds = match self.store.get_pomodoro_session(session_id).await.unwrap_or(None) {
                Some(session) => session.total_rounds,
                None => {
                    let guard = self.current.lock().await;
                    guard.as_ref().map(|s| s.total_rounds).unwrap_or(existing.len() as u32)
                }
            };

            let now = Utc::now();
            self.runtime.force_settlement(session_id, now).await;

            let mut handles = Vec::new();
            for round in 1..=total_rounds {
                if done.contains(&round) {
                    continue;
                }
                let manager = Arc::clone(self);
                let sid = session_id.to_string();
                handles.push(tokio::spawn(async move {
                    manager.run_phase_aggregation(&sid, round, now, now).await;
                }));
            }
            for h in handles {
                let _ = h.await;
            }

            self.wait_for_phases_terminal(session_id).await;

            let evaluation = self.runtime.evaluate_session_focus(session_id).await;
            let focus_score = evaluation.as_ref().map(|e| e.focus_score);

            if let Some(mut session) = self.store.get_pomodoro_session(session_id).await.unwrap_or(None) {
                session.llm_evaluation = evaluation;
                session.processing_status = ProcessingStatus::Completed;
                let _ = self.store.update_pomodoro_session(&session).await;
            }

            self.events.emit(Event::PomodoroProcessingComplete {
                session_id: session_id.to_string(),
                job_id: job_id.to_string(),
                focus_score,
                at: Utc::now(),
            });
        };

        if timeout(std::time::Duration::from_secs(TOTAL_PROCESSING_TIMEOUT_SECONDS), work)
            .await
            .is_err()
        {
            warn!(session_id, job_id, "post-session processing exceeded its total timeout budget");
            if let Some(mut session) = self.store.get_pomodoro_session(session_id).await.unwrap_or(None) {
                session.processing_status = ProcessingStatus::Failed;
                let _ = self.store.update_pomodoro_session(&session).await;
            }
            self.events.emit(Event::PomodoroProcessingFailed {
                session_id: session_id.to_string(),
                job_id: job_id.to_string(),
                reason: "total processing timeout exceeded".to_string(),
                at: Utc::now(),
            });
        }
    }

    async fn wait_for_phases_terminal(&self, session_id: &str) {
        let deadline = Utc::now() + chrono::Duration::seconds(MAX_PHASE_WAIT_SECONDS as i64);
        loop {
            let phases = self.store.get_work_phases(session_id).await.unwrap_or_default();
            let all_terminal = phases
                .iter()
                .all(|p| matches!(p.status, WorkPhaseStatus::Completed | WorkPhaseStatus::Failed));
            if all_terminal || Utc::now() >= deadline {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }

    pub async fn get_session_phases(&self, session_id: &str) -> Result<Vec<WorkPhase>, StoreError> {
        self.store.get_work_phases(session_id).await
    }

    /// Re-runs a failed or exhausted phase from a clean retry count,
    /// per the user-visible retry surface (spec §6, §7).
    pub async fn retry_work_phase(self: &Arc<Self>, session_id: &str, phase_number: u32) -> Result<(), PomodoroError> {
        let phases = self
            .store
            .get_work_phases(session_id)
            .await
            .map_err(|e| PomodoroError::SessionNotFound(e.to_string()))?;
        let phase = phases
            .into_iter()
            .find(|p| p.phase_number == phase_number)
            .ok_or(PomodoroError::WorkPhaseNotFound {
                session_id: session_id.to_string(),
                phase_number,
            })?;

        let manager = Arc::clone(self);
        let sid = session_id.to_string();
        let (start, end) = (phase.phase_start_time, phase.phase_end_time.unwrap_or_else(Utc::now));
        tokio::spawn(async move {
            manager.run_phase_aggregation(&sid, phase_number, start, end).await;
        });
        Ok(())
    }

    pub async fn retry_llm_evaluation(&self, session_id: &str) -> Result<(), PomodoroError> {
        let mut session = self
            .store
            .get_pomodoro_session(session_id)
            .await
            .map_err(|e| PomodoroError::SessionNotFound(e.to_string()))?
            .ok_or_else(|| PomodoroError::SessionNotFound(session_id.to_string()))?;

        let evaluation = self.runtime.evaluate_session_focus(session_id).await;
        let focus_score = evaluation.as_ref().map(|e| e.focus_score);
        session.llm_evaluation = evaluation;
        self.store
            .update_pomodoro_session(&session)
            .await
            .map_err(|e| PomodoroError::SessionNotFound(e.to_string()))?;

        self.events.emit(Event::PomodoroProcessingComplete {
            session_id: session_id.to_string(),
            job_id: String::new(),
            focus_score,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Orphan recovery (spec §4.10): any session found `active` at
    /// startup is a crash remnant. Returns the ids that were reclaimed.
    pub async fn check_orphaned_sessions(self: &Arc<Self>) -> Result<Vec<String>, StoreError> {
        let sessions = self.store.active_pomodoro_sessions().await?;
        let mut reclaimed = Vec::new();
        let now = Utc::now();

        for mut session in sessions {
            let elapsed_in_phase = match session.current_phase {
                PomodoroPhase::Work => session.elapsed_in_current_phase_minutes(now),
                _ => 0,
            };
            let actual_duration_minutes =
                session.completed_rounds as i64 * session.work_duration_minutes + elapsed_in_phase;

            session.status = PomodoroStatus::Abandoned;
            session.end_time = Some(now);
            session.actual_duration_minutes = Some(actual_duration_minutes);
            session.processing_status = ProcessingStatus::Pending;
            self.store.update_pomodoro_session(&session).await?;

            info!(session_id = %session.id, actual_duration_minutes, "reclaimed orphaned pomodoro session");
            reclaimed.push(session.id.clone());

            let manager = Arc::clone(self);
            let sid = session.id.clone();
            tokio::spawn(async move {
                manager.run_batch_processor(&sid).await;
            });
        }
        Ok(reclaimed)
    }
}
