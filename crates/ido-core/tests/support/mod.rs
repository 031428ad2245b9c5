//! Shared fakes for integration tests: an in-memory `Store`, a scripted
//! `LlmClient`, a fixed-template `PromptProvider`, and an event recorder.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ido_core::{Action, Activity, ChatMessage, ChatParams, ChatResponse, Event, PomodoroSession};
use ido_core::interfaces::{LlmClient, LlmError, PromptCategory, PromptError, PromptProvider, PromptTemplate, Store};
use ido_core::pomodoro::WorkPhase;
use ido_core::error::StoreError;

#[derive(Default)]
pub struct InMemoryStore {
    pub actions: Mutex<HashMap<String, Action>>,
    pub activities: Mutex<HashMap<String, Activity>>,
    pub sessions: Mutex<HashMap<String, PomodoroSession>>,
    pub work_phases: Mutex<HashMap<String, Vec<WorkPhase>>>,
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_action(&self, action: &Action) -> Result<(), StoreError> {
        self.actions.lock().unwrap().insert(action.id.clone(), action.clone());
        Ok(())
    }

    async fn get_action(&self, id: &str) -> Result<Option<Action>, StoreError> {
        Ok(self.actions.lock().unwrap().get(id).cloned())
    }

    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        self.activities.lock().unwrap().insert(activity.id.clone(), activity.clone());
        Ok(())
    }

    async fn update_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        self.activities.lock().unwrap().insert(activity.id.clone(), activity.clone());
        Ok(())
    }

    async fn get_activity(&self, id: &str) -> Result<Option<Activity>, StoreError> {
        Ok(self.activities.lock().unwrap().get(id).cloned())
    }

    async fn recent_activities(&self, since: DateTime<Utc>) -> Result<Vec<Activity>, StoreError> {
        Ok(self
            .activities
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.end_time >= since)
            .cloned()
            .collect())
    }

    async fn save_raw_records(&self, _records: &[ido_core::RawRecord]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn save_pomodoro_session(&self, session: &PomodoroSession) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update_pomodoro_session(&self, session: &PomodoroSession) -> Result<(), StoreError> {
        self.sessions.lock().unwrap().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_pomodoro_session(&self, id: &str) -> Result<Option<PomodoroSession>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn active_pomodoro_sessions(&self) -> Result<Vec<PomodoroSession>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect())
    }

    async fn save_work_phase(&self, phase: &WorkPhase) -> Result<(), StoreError> {
        let mut phases = self.work_phases.lock().unwrap();
        phases.entry(phase.session_id.clone()).or_default().push(phase.clone());
        Ok(())
    }

    async fn update_work_phase(&self, phase: &WorkPhase) -> Result<(), StoreError> {
        let mut phases = self.work_phases.lock().unwrap();
        let list = phases.entry(phase.session_id.clone()).or_default();
        if let Some(existing) = list.iter_mut().find(|p| p.id == phase.id) {
            *existing = phase.clone();
        } else {
            list.push(phase.clone());
        }
        Ok(())
    }

    async fn get_work_phases(&self, session_id: &str) -> Result<Vec<WorkPhase>, StoreError> {
        Ok(self.work_phases.lock().unwrap().get(session_id).cloned().unwrap_or_default())
    }

    async fn image_reference_hashes(&self) -> Result<HashSet<String>, StoreError> {
        let actions = self.actions.lock().unwrap();
        Ok(actions.values().flat_map(|a| a.screenshot_hashes.iter().cloned()).collect())
    }
}

/// Always answers with a fixed JSON body regardless of the prompt.
pub struct ScriptedLlmClient {
    pub response: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            response: Mutex::new(responses.into_iter().map(String::from).rev().collect()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, _messages: Vec<ChatMessage>, _params: ChatParams) -> Result<ChatResponse, LlmError> {
        let mut queue = self.response.lock().unwrap();
        let content = queue.pop().ok_or_else(|| LlmError("scripted responses exhausted".to_string()))?;
        Ok(ChatResponse { content, usage: None })
    }
}

/// Fails every call; used to exercise retry/error paths.
pub struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn chat(&self, _messages: Vec<ChatMessage>, _params: ChatParams) -> Result<ChatResponse, LlmError> {
        Err(LlmError("simulated backend outage".to_string()))
    }
}

/// A fixed template with no placeholders beyond what the agents already
/// substitute; good enough since tests assert on behavior, not wording.
pub struct FixedPromptProvider;

#[async_trait]
impl PromptProvider for FixedPromptProvider {
    async fn get(&self, category: PromptCategory, _language: &str) -> Result<PromptTemplate, PromptError> {
        Ok(PromptTemplate {
            system: format!("system prompt for {}", category.as_str()),
            user_template: "{scenes}{behavior_summary}{actions}".to_string(),
            params: HashMap::new(),
        })
    }
}

#[derive(Default)]
pub struct RecordingEventBus {
    pub events: Mutex<Vec<Event>>,
}

impl ido_core::EventBus for RecordingEventBus {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingEventBus {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }
}
