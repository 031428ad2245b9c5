//! Collaborator interfaces this core consumes (spec §6).
//!
//! Everything in this module is a thin trait boundary: the LLM wire
//! protocol, the prompt template store, and the persistence layer are
//! all out of this core's scope. Production code wires real
//! implementations in; tests wire in fakes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::activity::Activity;
use crate::error::StoreError;
use crate::pomodoro::{PomodoroSession, WorkPhase};
use crate::record::RawRecord;

// ---------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a (possibly multi-modal) message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64 data URL, e.g. `data:image/jpeg;base64,...`.
    ImageUrl { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn user_multimodal(text: impl Into<String>, image_data_urls: Vec<String>) -> Self {
        let mut content = vec![ContentPart::Text { text: text.into() }];
        content.extend(image_data_urls.into_iter().map(|url| ContentPart::ImageUrl { url }));
        Self {
            role: Role::User,
            content,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, thiserror::Error)]
#[error("LLM chat call failed: {0}")]
pub struct LlmError(pub String);

/// Consumed LLM wire protocol (spec §6). Out of scope: the transport
/// and model selection are the caller's concern.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>, params: ChatParams) -> Result<ChatResponse, LlmError>;
}

// ---------------------------------------------------------------------
// PromptProvider
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptCategory {
    /// Legacy single-step extraction path, retained only as a category name.
    ActionExtraction,
    ActionFromScenes,
    RawScene,
    ActionAggregation,
    /// Legacy event-based aggregation category name (spec §9).
    SessionAggregation,
}

impl PromptCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptCategory::ActionExtraction => "action_extraction",
            PromptCategory::ActionFromScenes => "action_from_scenes",
            PromptCategory::RawScene => "raw_scene",
            PromptCategory::ActionAggregation => "action_aggregation",
            PromptCategory::SessionAggregation => "session_aggregation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system: String,
    pub user_template: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
#[error("prompt provider failed for category '{category}': {message}")]
pub struct PromptError {
    pub category: String,
    pub message: String,
}

/// Consumed prompt template store (spec §6).
#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn get(&self, category: PromptCategory, language: &str) -> Result<PromptTemplate, PromptError>;
}

/// Substitutes `{name}` placeholders in a template with values from `params`.
pub fn render_template(template: &str, params: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

// ---------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------

/// Persistence collaborator (spec §6). Repositories are modeled as
/// associated methods on one trait rather than five traits, since every
/// implementation in practice shares one connection/transaction scope.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_action(&self, action: &Action) -> Result<(), StoreError>;
    async fn get_action(&self, id: &str) -> Result<Option<Action>, StoreError>;

    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError>;
    async fn update_activity(&self, activity: &Activity) -> Result<(), StoreError>;
    async fn get_activity(&self, id: &str) -> Result<Option<Activity>, StoreError>;
    /// Activities overlapping or ending within `lookback` of `since`, used
    /// by the SessionAgent's cross-batch merge (spec §4.9 step 7).
    async fn recent_activities(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Activity>, StoreError>;

    async fn save_raw_records(&self, records: &[RawRecord]) -> Result<(), StoreError>;

    async fn save_pomodoro_session(&self, session: &PomodoroSession) -> Result<(), StoreError>;
    async fn update_pomodoro_session(&self, session: &PomodoroSession) -> Result<(), StoreError>;
    async fn get_pomodoro_session(&self, id: &str) -> Result<Option<PomodoroSession>, StoreError>;
    async fn active_pomodoro_sessions(&self) -> Result<Vec<PomodoroSession>, StoreError>;

    async fn save_work_phase(&self, phase: &WorkPhase) -> Result<(), StoreError>;
    async fn update_work_phase(&self, phase: &WorkPhase) -> Result<(), StoreError>;
    async fn get_work_phases(&self, session_id: &str) -> Result<Vec<WorkPhase>, StoreError>;

    async fn image_reference_hashes(&self) -> Result<std::collections::HashSet<String>, StoreError>;
}

// ---------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------

/// Opaque keyed configuration with typed getters (spec §6). See
/// [`crate::settings::TomlSettings`] for a concrete implementation.
pub trait Settings: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_u64(&self, key: &str) -> Option<u64>;
    fn get_f64(&self, key: &str) -> Option<f64>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_string_list(&self, key: &str) -> Option<Vec<String>>;
}
