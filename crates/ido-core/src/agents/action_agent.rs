//! ActionAgent — second half of the two-step extraction: scene
//! descriptions -> persisted `Action`s (spec §4.8 steps 3-5).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::raw_agent::{strip_code_fence, Scene};
use crate::action::Action;
use crate::behavior::BehaviorAnalysis;
use crate::error::PipelineError;
use crate::image_store::ImageStore;
use crate::interfaces::{render_template, ChatMessage, ChatParams, LlmClient, PromptCategory, PromptProvider, Store};
use crate::record::{RawRecord, RawRecordData};

const MAX_SCENE_REFS_PER_ACTION: usize = crate::action::MAX_SCREENSHOT_HASHES;

#[derive(Debug, Deserialize)]
struct RawActionJson {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    scene_index: Vec<serde_json::Value>,
}

pub struct ActionExtractionOutcome {
    pub actions: Vec<Action>,
    /// Hashes pre-persisted for this batch but referenced by no saved
    /// action; scheduled for memory eviction (spec §4.8 step 5).
    pub unreferenced_hashes: Vec<String>,
}

pub struct ActionAgent {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptProvider>,
    image_store: Arc<ImageStore>,
}

impl ActionAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<dyn PromptProvider>, image_store: Arc<ImageStore>) -> Self {
        Self { llm, prompts, image_store }
    }

    /// Pre-persists every screenshot referenced by `scenes`, calls the
    /// `action_from_scenes` prompt, resolves and persists the resulting
    /// actions (spec §4.8 steps 3-5).
    pub async fn extract_and_persist(
        &self,
        selected: &[RawRecord],
        scenes: &[Scene],
        behavior: &BehaviorAnalysis,
        store: &dyn Store,
        language: &str,
    ) -> Result<ActionExtractionOutcome, PipelineError> {
        let hashes: Vec<String> = selected
            .iter()
            .filter_map(|r| match &r.data {
                RawRecordData::Screenshot(s) => Some(s.hash.clone()),
                _ => None,
            })
            .collect();

        let persisted = self.image_store.persist_batch(&hashes);
        for (hash, ok) in &persisted {
            if !ok {
                warn!(hash, "failed to pre-persist screenshot before action extraction");
            }
        }

        let template = self
            .prompts
            .get(PromptCategory::ActionFromScenes, language)
            .await
            .map_err(|e| PipelineError::LlmCallFailed {
                category: PromptCategory::ActionFromScenes.as_str().to_string(),
                message: e.message,
            })?;

        let scenes_text = serialize_scenes(scenes);
        let mut params = template.params.clone();
        params.insert("scenes".to_string(), scenes_text);
        params.insert("behavior_summary".to_string(), behavior.reasoning.clone());
        let user_text = render_template(&template.user_template, &params);

        let messages = vec![ChatMessage::system(template.system), ChatMessage::user_text(user_text)];
        let response = self
            .llm
            .chat(messages, ChatParams::default())
            .await
            .map_err(|e| PipelineError::LlmCallFailed {
                category: PromptCategory::ActionFromScenes.as_str().to_string(),
                message: e.0,
            })?;

        let raw_actions = parse_raw_actions(&response.content)?;
        let mut referenced = HashSet::new();
        let mut actions = Vec::new();

        for raw in raw_actions {
            let Some((timestamp, hashes)) = resolve_action(&raw, scenes, selected, &persisted) else {
                continue;
            };
            let action = Action::new(
                Uuid::new_v4().to_string(),
                raw.title,
                raw.description,
                raw.keywords,
                timestamp,
                hashes.clone(),
            );
            for hash in &hashes {
                referenced.insert(hash.clone());
            }
            if let Err(e) = store.save_action(&action).await {
                warn!(action_id = %action.id, error = %e, "failed to save action; dropping it");
                continue;
            }
            actions.push(action);
        }

        let unreferenced_hashes = persisted
            .into_iter()
            .filter(|(hash, ok)| *ok && !referenced.contains(hash))
            .map(|(hash, _)| hash)
            .collect();

        Ok(ActionExtractionOutcome { actions, unreferenced_hashes })
    }
}

/// Resolves one raw LLM action into `(timestamp, screenshot_hashes)`,
/// or `None` if it has no valid, persisted reference (spec §4.8 step 4,
/// §7 "Referential"/"Resource" drops).
fn resolve_action(
    raw: &RawActionJson,
    scenes: &[Scene],
    selected: &[RawRecord],
    persisted: &std::collections::HashMap<String, bool>,
) -> Option<(DateTime<Utc>, Vec<String>)> {
    let mut seen_scene = HashSet::new();
    let mut hashes = Vec::new();
    let mut timestamps = Vec::new();

    for value in &raw.scene_index {
        let Some(idx) = value.as_u64().map(|v| v as usize) else { continue };
        if idx >= scenes.len() || !seen_scene.insert(idx) {
            continue;
        }
        let scene = &scenes[idx];
        let Some(shot) = selected.get(scene.screenshot_index) else { continue };
        let RawRecordData::Screenshot(data) = &shot.data else { continue };
        if !persisted.get(&data.hash).copied().unwrap_or(false) {
            continue;
        }
        if hashes.len() >= MAX_SCENE_REFS_PER_ACTION {
            break;
        }
        timestamps.push(scene.timestamp.unwrap_or(shot.timestamp));
        hashes.push(data.hash.clone());
    }

    if hashes.is_empty() {
        return None;
    }
    let timestamp = timestamps.into_iter().min()?;
    Some((timestamp, hashes))
}

fn serialize_scenes(scenes: &[Scene]) -> String {
    scenes
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "[{i}] {} | text: {} | activity: {} | context: {}",
                s.visual_summary, s.detected_text, s.inferred_activity, s.application_context
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_raw_actions(content: &str) -> Result<Vec<RawActionJson>, PipelineError> {
    let value: serde_json::Value =
        serde_json::from_str(strip_code_fence(content)).map_err(|e| PipelineError::MalformedResponse {
            category: PromptCategory::ActionFromScenes.as_str().to_string(),
            message: e.to_string(),
        })?;
    let array = value.as_array().ok_or_else(|| PipelineError::UnexpectedShape {
        category: PromptCategory::ActionFromScenes.as_str().to_string(),
        message: "expected a top-level JSON array of actions".to_string(),
    })?;

    Ok(array
        .iter()
        .filter_map(|entry| serde_json::from_value::<RawActionJson>(entry.clone()).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(idx: usize) -> Scene {
        Scene {
            screenshot_index: idx,
            timestamp: None,
            visual_summary: "summary".into(),
            detected_text: String::new(),
            ui_elements: Vec::new(),
            application_context: String::new(),
            inferred_activity: String::new(),
            focus_areas: Vec::new(),
        }
    }

    fn shot(hash: &str, at: DateTime<Utc>) -> RawRecord {
        RawRecord::new(
            at,
            RawRecordData::Screenshot(crate::record::ScreenshotData {
                hash: hash.to_string(),
                monitor_index: 0,
                width: 10,
                height: 10,
                optimized_image: None,
                active_window: None,
            }),
        )
    }

    #[test]
    fn resolves_timestamp_as_earliest_referenced_scene() {
        let t0 = Utc::now();
        let scenes = vec![scene(0), scene(1)];
        let selected = vec![shot("a", t0), shot("b", t0 + chrono::Duration::seconds(10))];
        let mut persisted = std::collections::HashMap::new();
        persisted.insert("a".to_string(), true);
        persisted.insert("b".to_string(), true);
        let raw = RawActionJson {
            title: "t".into(),
            description: "d".into(),
            keywords: vec![],
            scene_index: vec![serde_json::json!(0), serde_json::json!(1)],
        };
        let (timestamp, hashes) = resolve_action(&raw, &scenes, &selected, &persisted).unwrap();
        assert_eq!(timestamp, t0);
        assert_eq!(hashes, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn drops_action_when_only_hash_failed_to_persist() {
        let t0 = Utc::now();
        let scenes = vec![scene(0)];
        let selected = vec![shot("a", t0)];
        let mut persisted = std::collections::HashMap::new();
        persisted.insert("a".to_string(), false);
        let raw = RawActionJson {
            title: "t".into(),
            description: "d".into(),
            keywords: vec![],
            scene_index: vec![serde_json::json!(0)],
        };
        assert!(resolve_action(&raw, &scenes, &selected, &persisted).is_none());
    }

    #[test]
    fn out_of_bounds_scene_index_is_dropped() {
        let scenes = vec![scene(0)];
        let selected = vec![shot("a", Utc::now())];
        let mut persisted = std::collections::HashMap::new();
        persisted.insert("a".to_string(), true);
        let raw = RawActionJson {
            title: "t".into(),
            description: "d".into(),
            keywords: vec![],
            scene_index: vec![serde_json::json!(7)],
        };
        assert!(resolve_action(&raw, &scenes, &selected, &persisted).is_none());
    }
}
