//! `WorkPhase` — per-round aggregation record (spec §3, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPhaseStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Classification of an `aggregate_work_phase` failure (spec §4.10,
/// mirroring `pomodoro_manager.py::_classify_aggregation_error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPhaseFailureKind {
    NoActionsFound,
    LlmClusteringFailed,
    SupervisorValidationFailed,
    DatabaseSaveFailed,
    UnknownError,
}

impl WorkPhaseFailureKind {
    /// Maps the `PipelineError` that an aggregation attempt produced to
    /// the classification taxonomy used in events and retry decisions.
    pub fn classify(err: &PipelineError) -> Self {
        match err {
            PipelineError::NoActionsFound => WorkPhaseFailureKind::NoActionsFound,
            PipelineError::ClusteringFailed(_) => WorkPhaseFailureKind::LlmClusteringFailed,
            PipelineError::SupervisorValidationFailed(_) => {
                WorkPhaseFailureKind::SupervisorValidationFailed
            }
            PipelineError::LlmCallFailed { .. }
            | PipelineError::MalformedResponse { .. }
            | PipelineError::UnexpectedShape { .. } => WorkPhaseFailureKind::UnknownError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPhase {
    pub id: String,
    pub session_id: String,
    /// 1-based, `<= total_rounds` (spec §3).
    pub phase_number: u32,
    pub status: WorkPhaseStatus,
    pub phase_start_time: DateTime<Utc>,
    pub phase_end_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub processing_error: Option<WorkPhaseFailureKind>,
    pub activity_count: usize,
}

impl WorkPhase {
    pub fn new(
        id: String,
        session_id: String,
        phase_number: u32,
        phase_start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id,
            phase_number,
            status: WorkPhaseStatus::Pending,
            phase_start_time,
            phase_end_time: None,
            retry_count: 0,
            processing_error: None,
            activity_count: 0,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = WorkPhaseStatus::Processing;
    }

    pub fn mark_completed(&mut self, activity_count: usize, at: DateTime<Utc>) {
        self.status = WorkPhaseStatus::Completed;
        self.activity_count = activity_count;
        self.phase_end_time = Some(at);
        self.processing_error = None;
    }

    /// Records a failed attempt. Returns `true` if the retry budget is
    /// exhausted (status becomes `failed`), `false` if it goes back to
    /// `pending` for another attempt (spec §4.10).
    pub fn mark_failed_attempt(&mut self, kind: WorkPhaseFailureKind, max_retries: u32) -> bool {
        self.processing_error = Some(kind);
        if self.retry_count >= max_retries {
            self.status = WorkPhaseStatus::Failed;
            true
        } else {
            self.retry_count += 1;
            self.status = WorkPhaseStatus::Pending;
            false
        }
    }

    /// `retry_count <= MAX_RETRIES` whenever `status = failed` (spec §8).
    pub fn invariant_holds(&self, max_retries: u32) -> bool {
        self.status != WorkPhaseStatus::Failed || self.retry_count <= max_retries
    }
}
