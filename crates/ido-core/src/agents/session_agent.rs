//! SessionAgent — action-based aggregation into Activities (spec §4.9).
//! Canonical aggregation path; the `event_based` mode only survives as
//! a persisted label (spec §9 Open Questions).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::warn;
use uuid::Uuid;

use super::raw_agent::strip_code_fence;
use crate::action::Action;
use crate::activity::{AggregationMode, Activity};
use crate::error::PipelineError;
use crate::interfaces::{render_template, ChatMessage, ChatParams, LlmClient, PromptCategory, PromptProvider, Store};

const DEFAULT_MIN_DURATION_MINUTES: i64 = 2;
const DEFAULT_MAX_SUPERVISOR_ITERATIONS: u32 = 3;
const DEFAULT_MERGE_TIME_GAP_TOLERANCE_SECONDS: i64 = 300;
const DEFAULT_MERGE_SIMILARITY_THRESHOLD: f64 = 0.6;
const DEFAULT_CROSS_BATCH_LOOKBACK_HOURS: i64 = 2;
const MAX_CONCURRENT_FOCUS_EVALUATIONS: usize = 4;

#[derive(Debug, Clone)]
pub struct SessionAgentConfig {
    pub min_duration_minutes: i64,
    pub max_supervisor_iterations: u32,
    pub merge_time_gap_tolerance_seconds: i64,
    pub merge_similarity_threshold: f64,
    pub cross_batch_lookback_hours: i64,
}

impl Default for SessionAgentConfig {
    fn default() -> Self {
        Self {
            min_duration_minutes: DEFAULT_MIN_DURATION_MINUTES,
            max_supervisor_iterations: DEFAULT_MAX_SUPERVISOR_ITERATIONS,
            merge_time_gap_tolerance_seconds: DEFAULT_MERGE_TIME_GAP_TOLERANCE_SECONDS,
            merge_similarity_threshold: DEFAULT_MERGE_SIMILARITY_THRESHOLD,
            cross_batch_lookback_hours: DEFAULT_CROSS_BATCH_LOOKBACK_HOURS,
        }
    }
}

/// A clustered-but-not-yet-persisted Activity (spec §4.9 step 3).
#[derive(Debug, Clone)]
pub struct DraftActivity {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source_action_ids: Vec<String>,
    pub topic_tags: Vec<String>,
}

impl DraftActivity {
    fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// Per-activity LLM focus evaluation (spec §4.9 "Focus score policy").
/// `None` means the caller should fall back to the deterministic
/// heuristic, matching an exception in the reference implementation.
#[async_trait]
pub trait FocusEvaluator: Send + Sync {
    async fn evaluate(&self, activity: &Activity, actions: &[Action]) -> Option<f64>;
}

#[derive(Deserialize)]
struct RawClusterJson {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    source: Vec<serde_json::Value>,
    #[serde(default)]
    topic_tags: Vec<String>,
}

pub struct SessionAgent {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptProvider>,
    focus_evaluator: Option<Arc<dyn FocusEvaluator>>,
    config: SessionAgentConfig,
}

impl SessionAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<dyn PromptProvider>) -> Self {
        Self { llm, prompts, focus_evaluator: None, config: SessionAgentConfig::default() }
    }

    pub fn with_config(mut self, config: SessionAgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_focus_evaluator(mut self, evaluator: Arc<dyn FocusEvaluator>) -> Self {
        self.focus_evaluator = Some(evaluator);
        self
    }

    /// Clusters `actions` into Activities, merges them against each
    /// other and against recent history, scores focus, and persists
    /// the result (spec §4.9). `pomodoro` tags every persisted Activity
    /// with its session id and work phase.
    pub async fn aggregate(
        &self,
        actions: &[Action],
        store: &dyn Store,
        language: &str,
        pomodoro: Option<(String, u32)>,
    ) -> Result<Vec<Activity>, PipelineError> {
        if actions.is_empty() {
            return Err(PipelineError::NoActionsFound);
        }

        let clusters = self.cluster(actions, language).await?;
        let mut drafts: Vec<DraftActivity> = clusters
            .into_iter()
            .filter(|d| d.duration().num_minutes() >= self.config.min_duration_minutes)
            .collect();

        if drafts.is_empty() {
            return Err(PipelineError::ClusteringFailed(
                "every clustered draft was below the minimum duration".to_string(),
            ));
        }

        drafts = self.supervise(drafts, language).await;
        drafts = merge_overlapping(drafts, &self.config);

        let mut activities = Vec::with_capacity(drafts.len());
        let since = Utc::now() - chrono::Duration::hours(self.config.cross_batch_lookback_hours);
        let recent = store.recent_activities(since).await.unwrap_or_default();

        for draft in drafts {
            match find_cross_batch_match(&draft, &recent, &self.config) {
                Some(existing) => {
                    let mut merged = merge_into_existing(existing, &draft);
                    if let Some((session_id, phase)) = &pomodoro {
                        merged.pomodoro_session_id = Some(session_id.clone());
                        merged.pomodoro_work_phase = Some(*phase);
                    }
                    store.update_activity(&merged).await.map_err(|e| {
                        PipelineError::ClusteringFailed(format!("failed to update merged activity: {e}"))
                    })?;
                    activities.push(merged);
                }
                None => {
                    let mut activity = Activity::new(
                        Uuid::new_v4().to_string(),
                        draft.title,
                        draft.description,
                        draft.start_time,
                        draft.end_time,
                        draft.source_action_ids,
                        AggregationMode::ActionBased,
                        draft.topic_tags,
                    )
                    .map_err(|e| PipelineError::ClusteringFailed(e.to_string()))?;
                    if let Some((session_id, phase)) = &pomodoro {
                        activity = activity.for_pomodoro(session_id.clone(), *phase);
                    }
                    store
                        .save_activity(&activity)
                        .await
                        .map_err(|e| PipelineError::ClusteringFailed(format!("failed to save activity: {e}")))?;
                    activities.push(activity);
                }
            }
        }

        self.score_focus(&mut activities, actions, store).await;
        Ok(activities)
    }

    async fn cluster(&self, actions: &[Action], language: &str) -> Result<Vec<DraftActivity>, PipelineError> {
        let template = self
            .prompts
            .get(PromptCategory::ActionAggregation, language)
            .await
            .map_err(|e| PipelineError::LlmCallFailed {
                category: PromptCategory::ActionAggregation.as_str().to_string(),
                message: e.message,
            })?;

        let serialized = actions
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{}. {} -- {} ({})", i + 1, a.title, a.description, a.timestamp))
            .collect::<Vec<_>>()
            .join("\n");

        let mut params = template.params.clone();
        params.insert("actions".to_string(), serialized);
        let user_text = render_template(&template.user_template, &params);
        let messages = vec![ChatMessage::system(template.system), ChatMessage::user_text(user_text)];

        let response = self
            .llm
            .chat(messages, ChatParams::default())
            .await
            .map_err(|e| PipelineError::LlmCallFailed {
                category: PromptCategory::ActionAggregation.as_str().to_string(),
                message: e.0,
            })?;

        let clusters = parse_clusters(&response.content)?;
        Ok(build_drafts(clusters, actions))
    }

    /// Bounded supervisor revision pass (spec §4.9 step 5): a revision
    /// that changes the activity count is rejected outright.
    async fn supervise(&self, drafts: Vec<DraftActivity>, language: &str) -> Vec<DraftActivity> {
        let mut current = drafts;
        for _ in 0..self.config.max_supervisor_iterations {
            let Ok(Some(revised)) = self.try_revise(&current, language).await else {
                break;
            };
            if revised.len() != current.len() {
                warn!("supervisor revision changed activity count; rejecting");
                break;
            }
            current = current
                .into_iter()
                .zip(revised)
                .map(|(mut draft, (title, description))| {
                    draft.title = title;
                    draft.description = description;
                    draft
                })
                .collect();
        }
        current
    }

    async fn try_revise(
        &self,
        drafts: &[DraftActivity],
        language: &str,
    ) -> Result<Option<Vec<(String, String)>>, PipelineError> {
        let template = self.prompts.get(PromptCategory::ActionAggregation, language).await.ok();
        let Some(template) = template else { return Ok(None) };

        let serialized = drafts
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{}. {} -- {}", i + 1, d.title, d.description))
            .collect::<Vec<_>>()
            .join("\n");
        let mut params = template.params.clone();
        params.insert("mode".to_string(), "supervise".to_string());
        params.insert("draft_activities".to_string(), serialized);
        let user_text = render_template(&template.user_template, &params);
        let messages = vec![ChatMessage::system(template.system), ChatMessage::user_text(user_text)];

        let response = self.llm.chat(messages, ChatParams::default()).await.map_err(|e| {
            PipelineError::LlmCallFailed {
                category: PromptCategory::ActionAggregation.as_str().to_string(),
                message: e.0,
            }
        })?;

        let value: serde_json::Value = match serde_json::from_str(strip_code_fence(&response.content)) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        let Some(array) = value.as_array() else { return Ok(None) };

        let revised: Vec<(String, String)> = array
            .iter()
            .filter_map(|entry| {
                let title = entry.get("title")?.as_str()?.to_string();
                let description = entry.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                Some((title, description))
            })
            .collect();
        Ok(Some(revised))
    }

    async fn score_focus(&self, activities: &mut [Activity], actions: &[Action], _store: &dyn Store) {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_FOCUS_EVALUATIONS));
        let mut handles = Vec::new();

        for (i, activity) in activities.iter().enumerate() {
            let relevant: Vec<Action> = actions
                .iter()
                .filter(|a| activity.source_action_ids.contains(&a.id))
                .cloned()
                .collect();
            let evaluator = self.focus_evaluator.clone();
            let activity = activity.clone();
            let permit = Arc::clone(&semaphore);
            handles.push((i, tokio::spawn(async move {
                let _permit = permit.acquire().await;
                let score = match &evaluator {
                    Some(eval) => eval.evaluate(&activity, &relevant).await,
                    None => None,
                };
                score.unwrap_or_else(|| heuristic_focus_score(&activity, relevant.len()))
            })));
        }

        for (i, handle) in handles {
            if let Ok(score) = handle.await {
                activities[i].focus_score = Some((score.clamp(0.0, 1.0) * 100.0).round() as u8);
            }
        }
    }
}

/// Deterministic fallback focus score in `[0, 1]` (spec §4.9) from
/// action density, topic count, and duration.
fn heuristic_focus_score(activity: &Activity, action_count: usize) -> f64 {
    let duration_minutes = activity.session_duration_minutes.max(1);
    let density = action_count as f64 / duration_minutes as f64;
    let density_score = (density / 2.0).min(1.0);

    let topic_multiplier = match activity.topic_tags.len() {
        0..=1 => 1.0,
        2..=3 => 0.85,
        _ => 0.6,
    };
    let duration_multiplier = match duration_minutes {
        0..=4 => 0.7,
        5..=14 => 0.9,
        15..=44 => 1.0,
        _ => 0.85,
    };

    (density_score * topic_multiplier * duration_multiplier).clamp(0.0, 1.0)
}

fn parse_clusters(content: &str) -> Result<Vec<RawClusterJson>, PipelineError> {
    let value: serde_json::Value =
        serde_json::from_str(strip_code_fence(content)).map_err(|e| PipelineError::MalformedResponse {
            category: PromptCategory::ActionAggregation.as_str().to_string(),
            message: e.to_string(),
        })?;
    let array = value.as_array().ok_or_else(|| PipelineError::UnexpectedShape {
        category: PromptCategory::ActionAggregation.as_str().to_string(),
        message: "expected a top-level JSON array of clusters".to_string(),
    })?;
    Ok(array
        .iter()
        .filter_map(|entry| serde_json::from_value::<RawClusterJson>(entry.clone()).ok())
        .collect())
}

/// Builds draft activities from parsed clusters: 1-based indices,
/// dedup, bounds-check, fail-open on malformed clusters (spec §4.9
/// step 2-3).
fn build_drafts(clusters: Vec<RawClusterJson>, actions: &[Action]) -> Vec<DraftActivity> {
    let mut drafts = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let mut seen = HashSet::new();
        let mut indices: Vec<usize> = Vec::new();
        for value in &cluster.source {
            let Some(one_based) = value.as_u64() else { continue };
            if one_based == 0 {
                continue;
            }
            let idx = (one_based - 1) as usize;
            if idx >= actions.len() || !seen.insert(idx) {
                continue;
            }
            indices.push(idx);
        }
        if indices.is_empty() {
            continue;
        }

        let referenced: Vec<&Action> = indices.iter().map(|&i| &actions[i]).collect();
        let start_time = referenced.iter().map(|a| a.timestamp).min().unwrap();
        let end_time = referenced.iter().map(|a| a.timestamp).max().unwrap();
        drafts.push(DraftActivity {
            title: cluster.title,
            description: cluster.description,
            start_time,
            end_time,
            source_action_ids: referenced.iter().map(|a| a.id.clone()).collect(),
            topic_tags: cluster.topic_tags,
        });
    }
    drafts
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn similarity(a: &DraftActivity, b: &DraftActivity) -> f64 {
    let title_sim = jaccard(&word_set(&a.title), &word_set(&b.title));
    let topic_sim = jaccard(
        &a.topic_tags.iter().cloned().collect(),
        &b.topic_tags.iter().cloned().collect(),
    );
    0.7 * title_sim + 0.3 * topic_sim
}

fn should_merge(a: &DraftActivity, b: &DraftActivity, config: &SessionAgentConfig) -> bool {
    if a.end_time > b.start_time {
        return true;
    }
    let gap_seconds = (b.start_time - a.end_time).num_seconds();
    gap_seconds <= config.merge_time_gap_tolerance_seconds
        && similarity(a, b) >= config.merge_similarity_threshold
}

fn merge_pair(a: DraftActivity, b: DraftActivity) -> DraftActivity {
    let (primary, secondary) = if a.duration() >= b.duration() { (a, b) } else { (b, a) };
    let mut source_action_ids = primary.source_action_ids.clone();
    for id in &secondary.source_action_ids {
        if !source_action_ids.contains(id) {
            source_action_ids.push(id.clone());
        }
    }
    let mut topic_tags = primary.topic_tags.clone();
    for tag in &secondary.topic_tags {
        if !topic_tags.contains(tag) {
            topic_tags.push(tag.clone());
        }
    }
    DraftActivity {
        title: primary.title.clone(),
        description: format!("{}\n[Related: {}] {}", primary.description, secondary.title, secondary.description),
        start_time: primary.start_time.min(secondary.start_time),
        end_time: primary.end_time.max(secondary.end_time),
        source_action_ids,
        topic_tags,
    }
}

/// Merges overlapping/near/similar drafts within the batch (spec §4.9
/// step 6), iterating to a fixpoint.
fn merge_overlapping(mut drafts: Vec<DraftActivity>, config: &SessionAgentConfig) -> Vec<DraftActivity> {
    drafts.sort_by_key(|d| d.start_time);
    loop {
        let mut merged_any = false;
        let mut result: Vec<DraftActivity> = Vec::with_capacity(drafts.len());
        let mut iter = drafts.into_iter();
        let Some(mut current) = iter.next() else { return result };

        for next in iter {
            if should_merge(&current, &next, config) {
                current = merge_pair(current, next);
                merged_any = true;
            } else {
                result.push(current);
                current = next;
            }
        }
        result.push(current);

        if !merged_any {
            return result;
        }
        drafts = result;
        drafts.sort_by_key(|d| d.start_time);
    }
}

fn find_cross_batch_match<'a>(
    draft: &DraftActivity,
    recent: &'a [Activity],
    config: &SessionAgentConfig,
) -> Option<&'a Activity> {
    recent.iter().find(|existing| {
        let as_draft = DraftActivity {
            title: existing.title.clone(),
            description: existing.description.clone(),
            start_time: existing.start_time,
            end_time: existing.end_time,
            source_action_ids: existing.source_action_ids.clone(),
            topic_tags: existing.topic_tags.clone(),
        };
        should_merge(&as_draft, draft, config) || should_merge(draft, &as_draft, config)
    })
}

fn merge_into_existing(existing: &Activity, draft: &DraftActivity) -> Activity {
    let mut source_action_ids = existing.source_action_ids.clone();
    for id in &draft.source_action_ids {
        if !source_action_ids.contains(id) {
            source_action_ids.push(id.clone());
        }
    }
    let mut topic_tags = existing.topic_tags.clone();
    for tag in &draft.topic_tags {
        if !topic_tags.contains(tag) {
            topic_tags.push(tag.clone());
        }
    }
    let start_time = existing.start_time.min(draft.start_time);
    let end_time = existing.end_time.max(draft.end_time);
    let mut merged = existing.clone();
    merged.start_time = start_time;
    merged.end_time = end_time;
    merged.session_duration_minutes = (end_time - start_time).num_minutes().max(0);
    merged.source_action_ids = source_action_ids;
    merged.topic_tags = topic_tags;
    merged.description = format!("{}\n[Related: {}] {}", existing.description, draft.title, draft.description);
    merged.updated_at = Utc::now();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, title: &str, at: DateTime<Utc>) -> Action {
        Action::new(id.to_string(), title.to_string(), "desc".to_string(), vec![], at, vec![format!("h-{id}")])
    }

    fn draft(title: &str, start: DateTime<Utc>, end: DateTime<Utc>, tags: &[&str]) -> DraftActivity {
        DraftActivity {
            title: title.to_string(),
            description: "d".to_string(),
            start_time: start,
            end_time: end,
            source_action_ids: vec!["a".to_string()],
            topic_tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn build_drafts_normalizes_one_based_indices_and_fails_open() {
        let t0 = Utc::now();
        let actions = vec![action("1", "a", t0), action("2", "b", t0 + chrono::Duration::minutes(1))];
        let clusters = vec![
            RawClusterJson {
                title: "work".into(),
                description: "".into(),
                source: vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(99)],
                topic_tags: vec![],
            },
            RawClusterJson {
                title: "empty".into(),
                description: "".into(),
                source: vec![],
                topic_tags: vec![],
            },
        ];
        let drafts = build_drafts(clusters, &actions);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].source_action_ids.len(), 2);
    }

    #[test]
    fn merges_activities_within_gap_and_similarity() {
        let t0 = Utc::now();
        let a = draft("edit spec.md", t0, t0 + chrono::Duration::minutes(10), &["writing"]);
        let b = draft(
            "edit spec.md section 4",
            t0 + chrono::Duration::minutes(13),
            t0 + chrono::Duration::minutes(15),
            &["writing"],
        );
        let merged = merge_overlapping(vec![a, b], &SessionAgentConfig::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "edit spec.md");
        assert!(merged[0].description.contains("[Related:"));
        assert_eq!(merged[0].topic_tags, vec!["writing".to_string()]);
    }

    #[test]
    fn does_not_merge_dissimilar_distant_activities() {
        let t0 = Utc::now();
        let a = draft("write spec", t0, t0 + chrono::Duration::minutes(10), &["writing"]);
        let b = draft(
            "watch a video",
            t0 + chrono::Duration::hours(2),
            t0 + chrono::Duration::hours(2) + chrono::Duration::minutes(5),
            &["leisure"],
        );
        let merged = merge_overlapping(vec![a, b], &SessionAgentConfig::default());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn heuristic_focus_score_is_bounded() {
        let activity = Activity::new(
            "id".into(),
            "t".into(),
            "d".into(),
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(20),
            vec!["a".into()],
            AggregationMode::ActionBased,
            vec!["one".into()],
        )
        .unwrap();
        let score = heuristic_focus_score(&activity, 10);
        assert!((0.0..=1.0).contains(&score));
    }
}
