//! RawAgent — first half of the two-step extraction: images + activity
//! summary -> per-screenshot scene descriptions (spec §4.8).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorAnalysis;
use crate::error::PipelineError;
use crate::interfaces::{ChatMessage, ChatParams, LlmClient, PromptCategory, PromptProvider};
use crate::record::{RawRecord, RawRecordData};

/// A textual, memory-only description of one screenshot (spec glossary:
/// "Scene"). Never persisted — only `Action`s derived from scenes are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub screenshot_index: usize,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visual_summary: String,
    #[serde(default)]
    pub detected_text: String,
    #[serde(default)]
    pub ui_elements: Vec<String>,
    #[serde(default)]
    pub application_context: String,
    #[serde(default)]
    pub inferred_activity: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

pub struct RawAgent {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptProvider>,
}

impl RawAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<dyn PromptProvider>) -> Self {
        Self { llm, prompts }
    }

    /// Calls the LLM with the `raw_scene` prompt over `selected` plus
    /// the activity summary and [`BehaviorAnalysis`], and parses the
    /// returned JSON list of [`Scene`]s (spec §4.8 step 2).
    pub async fn extract_scenes(
        &self,
        selected: &[RawRecord],
        behavior: &BehaviorAnalysis,
        language: &str,
    ) -> Result<Vec<Scene>, PipelineError> {
        let template = self
            .prompts
            .get(PromptCategory::RawScene, language)
            .await
            .map_err(|e| PipelineError::LlmCallFailed {
                category: PromptCategory::RawScene.as_str().to_string(),
                message: e.message,
            })?;

        let image_urls: Vec<String> = selected
            .iter()
            .filter_map(|r| match &r.data {
                RawRecordData::Screenshot(s) => s.optimized_image.clone(),
                _ => None,
            })
            .map(|b64| format!("data:image/jpeg;base64,{b64}"))
            .collect();

        let mut params = template.params.clone();
        params.insert("behavior_summary".to_string(), behavior.reasoning.clone());
        let user_text = crate::interfaces::render_template(&template.user_template, &params);

        let messages = vec![
            ChatMessage::system(template.system),
            ChatMessage::user_multimodal(user_text, image_urls),
        ];

        let response = self
            .llm
            .chat(messages, ChatParams::default())
            .await
            .map_err(|e| PipelineError::LlmCallFailed {
                category: PromptCategory::RawScene.as_str().to_string(),
                message: e.0,
            })?;

        parse_scenes(&response.content)
    }
}

fn parse_scenes(content: &str) -> Result<Vec<Scene>, PipelineError> {
    let value: serde_json::Value =
        serde_json::from_str(strip_code_fence(content)).map_err(|e| PipelineError::MalformedResponse {
            category: PromptCategory::RawScene.as_str().to_string(),
            message: e.to_string(),
        })?;
    let array = value.as_array().ok_or_else(|| PipelineError::UnexpectedShape {
        category: PromptCategory::RawScene.as_str().to_string(),
        message: "expected a top-level JSON array of scenes".to_string(),
    })?;

    let mut scenes = Vec::with_capacity(array.len());
    for entry in array {
        match serde_json::from_value::<Scene>(entry.clone()) {
            Ok(scene) => scenes.push(scene),
            Err(_) => continue, // malformed entry: drop, batch continues (spec §7)
        }
    }
    Ok(scenes)
}

/// LLMs frequently wrap JSON in ```json fences despite instructions not
/// to; strip them defensively before parsing.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_end_matches("```").trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_scene_list() {
        let json = r#"[{"screenshot_index":0,"visual_summary":"an editor"}]"#;
        let scenes = parse_scenes(json).unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].screenshot_index, 0);
    }

    #[test]
    fn drops_malformed_entries_but_keeps_the_batch() {
        let json = r#"[{"screenshot_index":0},{"screenshot_index":"not a number"}]"#;
        let scenes = parse_scenes(json).unwrap();
        assert_eq!(scenes.len(), 1);
    }

    #[test]
    fn non_array_top_level_is_unexpected_shape() {
        let err = parse_scenes(r#"{"not":"an array"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::UnexpectedShape { .. }));
    }

    #[test]
    fn non_json_content_is_malformed() {
        let err = parse_scenes("not json at all").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse { .. }));
    }

    #[test]
    fn strips_markdown_code_fences() {
        let wrapped = "```json\n[{\"screenshot_index\":0}]\n```";
        let scenes = parse_scenes(wrapped).unwrap();
        assert_eq!(scenes.len(), 1);
    }
}
