//! Activity — a coarser, potentially multi-minute work session aggregated
//! from actions (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    ActionBased,
    /// Retained only as a back-compat label on persisted Activities
    /// (spec §9 Open Questions) — action-based aggregation is canonical.
    EventBased,
}

/// Validation error raised when an [`Activity`] would violate an
/// invariant (spec §3, §8). Kept distinct from [`crate::error::CoreError`]
/// so callers can match on it precisely.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("activity start_time ({start}) is after end_time ({end})")]
    StartAfterEnd {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("activity has no source actions or events")]
    NoSources,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source_action_ids: Vec<String>,
    #[serde(default)]
    pub source_event_ids: Vec<String>,
    pub aggregation_mode: AggregationMode,
    pub session_duration_minutes: i64,
    pub topic_tags: Vec<String>,
    pub pomodoro_session_id: Option<String>,
    pub pomodoro_work_phase: Option<u32>,
    /// Canonical range is `[0, 100]` at the persistence boundary (spec §9).
    pub focus_score: Option<u8>,
    /// IDs of activities merged into this one, oldest first.
    #[serde(default)]
    pub merged_from: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

impl Activity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        title: String,
        description: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        source_action_ids: Vec<String>,
        aggregation_mode: AggregationMode,
        topic_tags: Vec<String>,
    ) -> Result<Self, ValidationError> {
        if start_time > end_time {
            return Err(ValidationError::StartAfterEnd {
                start: start_time,
                end: end_time,
            });
        }
        if source_action_ids.is_empty() {
            return Err(ValidationError::NoSources);
        }
        let now = Utc::now();
        let session_duration_minutes = (end_time - start_time).num_minutes().max(0);
        Ok(Self {
            id,
            title,
            description,
            start_time,
            end_time,
            source_action_ids,
            source_event_ids: Vec::new(),
            aggregation_mode,
            session_duration_minutes,
            topic_tags,
            pomodoro_session_id: None,
            pomodoro_work_phase: None,
            focus_score: None,
            merged_from: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted: false,
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start_time > self.end_time {
            return Err(ValidationError::StartAfterEnd {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.source_action_ids.is_empty() && self.source_event_ids.is_empty() {
            return Err(ValidationError::NoSources);
        }
        Ok(())
    }

    pub fn for_pomodoro(mut self, session_id: String, work_phase: u32) -> Self {
        self.pomodoro_session_id = Some(session_id);
        self.pomodoro_work_phase = Some(work_phase);
        self
    }
}

impl From<ValidationError> for CoreError {
    fn from(e: ValidationError) -> Self {
        CoreError::Custom(e.to_string())
    }
}
