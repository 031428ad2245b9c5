//! Coordinator — composition root tying perception, filtering,
//! extraction and Pomodoro lifecycle together (spec §4.11).
//!
//! Owns every collaborator and exposes the thin outer surface a host
//! application drives: `start`/`stop`, one periodic `tick_now`,
//! sleep/wake, and Pomodoro mode switches. Everything else (clustering,
//! retry budgets, image dedup) lives in the module it belongs to; this
//! file only sequences calls into those modules.

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::action::Action;
use crate::activity::Activity;
use crate::agents::{ActionAgent, RawAgent, SessionAgent};
use crate::behavior::BehaviorAnalyzer;
use crate::buffer::SlidingWindowBuffer;
use crate::error::PipelineError;
use crate::filters::image_filter::ImageBytesSource;
use crate::filters::{ImageFilter, ImageSampler, RecordFilter};
use crate::image_store::ImageStore;
use crate::interfaces::{LlmClient, PromptProvider, Store};
use crate::perception::{
    ActiveMonitorTracker, KeyboardCapture, MouseCapture, PauseFlag, PerceptionSource, ScreenStateMonitor,
    ScreenshotCapture,
};
use crate::pomodoro::{LlmEvaluation, PomodoroManager, PomodoroRuntime};
use crate::record::RawRecord;

/// Observable run state a host application polls or displays (spec
/// SPEC_FULL supplement 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorMode {
    Stopped,
    Starting,
    Running,
    /// No usable LLM backend is configured; perception still idle.
    RequiresModel,
    Error,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSnapshot {
    pub mode: CoordinatorMode,
    pub last_processed_ts: Option<DateTime<Utc>>,
    pub paused: bool,
    pub pomodoro_active: bool,
    pub accumulated_screenshots: usize,
}

/// Whether a model backend is actually reachable before perception
/// starts (spec SPEC_FULL supplement 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    RequiresModel,
}

#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> Result<Readiness, String>;
}

/// Always reports ready; the default for setups where model
/// availability is asserted out of band.
pub struct AlwaysReady;

#[async_trait]
impl ReadinessCheck for AlwaysReady {
    async fn check(&self) -> Result<Readiness, String> {
        Ok(Readiness::Ready)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub tick_interval_seconds: i64,
    pub screenshot_threshold: usize,
    /// Multiplier past `screenshot_threshold` that forces a drain even
    /// if the normal trigger hasn't fired (spec §4.8).
    pub forced_drain_multiplier: f64,
    pub max_accumulation_time_seconds: i64,
    pub max_screenshots_per_extraction: usize,
    /// Continuous-mode (non-Pomodoro) action-to-activity aggregation
    /// cadence; distinct from the per-tick extraction cadence.
    pub session_aggregation_interval_seconds: i64,
    pub language: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 30,
            screenshot_threshold: 20,
            forced_drain_multiplier: 1.5,
            max_accumulation_time_seconds: 180,
            max_screenshots_per_extraction: 10,
            session_aggregation_interval_seconds: 300,
            language: "en".to_string(),
        }
    }
}

/// Continuous-mode screenshot/behavior-record accumulator (spec §4.8).
/// Cleared whenever a Pomodoro session begins (spec §9 Open Questions:
/// the continuous accumulator must not survive into a Pomodoro phase).
#[derive(Default)]
struct Accumulator {
    screenshots: Vec<RawRecord>,
    behavior_records: Vec<RawRecord>,
}

/// Per-Pomodoro-session state the Coordinator tracks itself, since
/// `Store` exposes no raw-record/action retrieval by range (spec §6).
#[derive(Default)]
struct PomodoroState {
    session_id: Option<String>,
    /// Raw records captured while this session is active, not yet
    /// settled into Actions.
    pending: Vec<RawRecord>,
    /// Actions extracted so far this session, filtered by timestamp
    /// when a work phase is aggregated.
    actions: Vec<Action>,
    /// Activities saved by completed work-phase aggregations, used for
    /// the session-level focus evaluation.
    activities: Vec<Activity>,
}

/// Decodes persisted bytes back out of an [`ImageStore`] for
/// [`ImageFilter`]'s content-gate pass.
struct ImageStoreBytesSource(Arc<ImageStore>);

impl ImageBytesSource for ImageStoreBytesSource {
    fn load(&self, hash: &str) -> Option<Vec<u8>> {
        let b64 = self.0.get(hash)?;
        BASE64.decode(b64).ok()
    }
}

/// Everything the Coordinator needs handed in at construction. A plain
/// field bag rather than a builder since every field is required and
/// there's no sensible partial-construction state.
pub struct CoordinatorDeps {
    pub pause: PauseFlag,
    pub receiver: UnboundedReceiver<RawRecord>,
    pub keyboard: Arc<KeyboardCapture>,
    pub mouse: Arc<MouseCapture>,
    pub screenshot: Arc<ScreenshotCapture>,
    pub screen_state: Arc<ScreenStateMonitor>,
    pub active_monitor: Arc<ActiveMonitorTracker>,
    pub image_store: Arc<ImageStore>,
    pub store: Arc<dyn Store>,
    pub llm: Arc<dyn LlmClient>,
    pub prompts: Arc<dyn PromptProvider>,
    pub readiness: Arc<dyn ReadinessCheck>,
    pub config: CoordinatorConfig,
}

pub struct Coordinator {
    pause: PauseFlag,
    receiver: Mutex<UnboundedReceiver<RawRecord>>,
    keyboard: Arc<KeyboardCapture>,
    mouse: Arc<MouseCapture>,
    screenshot: Arc<ScreenshotCapture>,
    #[allow(dead_code)]
    screen_state: Arc<ScreenStateMonitor>,
    #[allow(dead_code)]
    active_monitor: Arc<ActiveMonitorTracker>,
    image_store: Arc<ImageStore>,
    image_bytes_source: ImageStoreBytesSource,
    store: Arc<dyn Store>,

    buffer: SlidingWindowBuffer,
    record_filter: RecordFilter,
    image_filter: ImageFilter,
    image_sampler: ImageSampler,
    behavior_analyzer: BehaviorAnalyzer,
    raw_agent: RawAgent,
    action_agent: ActionAgent,
    session_agent: SessionAgent,

    readiness: Arc<dyn ReadinessCheck>,
    config: CoordinatorConfig,

    mode: Mutex<CoordinatorMode>,
    last_processed_ts: Mutex<Option<DateTime<Utc>>>,
    last_extraction_time: Mutex<DateTime<Utc>>,
    last_session_aggregation_time: Mutex<DateTime<Utc>>,
    accumulator: Mutex<Accumulator>,
    /// Actions extracted in continuous mode, awaiting the next
    /// session-aggregation sweep (spec §4.9, ambient to continuous mode).
    continuous_pending_actions: Mutex<Vec<Action>>,
    pomodoro_state: Mutex<PomodoroState>,

    pomodoro: OnceLock<Arc<PomodoroManager>>,
}

impl Coordinator {
    /// Builds the full composition root, including the Pomodoro manager
    /// that owns a back-reference into this Coordinator via
    /// [`PomodoroRuntime`]. The cycle is resolved with two-phase
    /// construction: the Coordinator is built first with an empty
    /// `OnceLock`, a thin adapter implementing `PomodoroRuntime` is
    /// wired to it, and the resulting `PomodoroManager` is filled in
    /// after the fact (spec §9 "Cyclic ownership").
    pub fn new(deps: CoordinatorDeps, events: Arc<dyn crate::events::EventBus>) -> Arc<Self> {
        let image_store = deps.image_store;
        let image_filter = ImageFilter::new(Default::default());
        let now = Utc::now();

        let coordinator = Arc::new(Self {
            pause: deps.pause,
            receiver: Mutex::new(deps.receiver),
            keyboard: deps.keyboard,
            mouse: deps.mouse,
            screenshot: deps.screenshot,
            screen_state: deps.screen_state,
            active_monitor: deps.active_monitor,
            image_bytes_source: ImageStoreBytesSource(Arc::clone(&image_store)),
            action_agent: ActionAgent::new(Arc::clone(&deps.llm), Arc::clone(&deps.prompts), Arc::clone(&image_store)),
            image_store,
            store: Arc::clone(&deps.store),
            buffer: SlidingWindowBuffer::new(),
            record_filter: RecordFilter::new(Default::default()),
            image_filter,
            image_sampler: ImageSampler::new(deps.config.max_screenshots_per_extraction, 2.5),
            behavior_analyzer: BehaviorAnalyzer::new(),
            raw_agent: RawAgent::new(Arc::clone(&deps.llm), Arc::clone(&deps.prompts)),
            session_agent: SessionAgent::new(Arc::clone(&deps.llm), Arc::clone(&deps.prompts)),
            readiness: deps.readiness,
            config: deps.config,
            mode: Mutex::new(CoordinatorMode::Stopped),
            last_processed_ts: Mutex::new(None),
            last_extraction_time: Mutex::new(now),
            last_session_aggregation_time: Mutex::new(now),
            accumulator: Mutex::new(Accumulator::default()),
            continuous_pending_actions: Mutex::new(Vec::new()),
            pomodoro_state: Mutex::new(PomodoroState::default()),
            pomodoro: OnceLock::new(),
        });

        let runtime: Arc<dyn PomodoroRuntime> = Arc::new(CoordinatorRuntime(Arc::clone(&coordinator)));
        let manager = Arc::new(PomodoroManager::new(Arc::clone(&deps.store), events, runtime));
        let _ = coordinator.pomodoro.set(manager);

        coordinator
    }

    fn pomodoro(&self) -> Arc<PomodoroManager> {
        Arc::clone(
            self.pomodoro
                .get()
                .expect("PomodoroManager is set by Coordinator::new before any other method runs"),
        )
    }

    pub fn pomodoro_manager(&self) -> Arc<PomodoroManager> {
        self.pomodoro()
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            mode: *self.mode.lock().unwrap(),
            last_processed_ts: *self.last_processed_ts.lock().unwrap(),
            paused: self.pause.is_paused(),
            pomodoro_active: self.pomodoro_state.lock().unwrap().session_id.is_some(),
            accumulated_screenshots: self.accumulator.lock().unwrap().screenshots.len(),
        }
    }

    /// Starts perception after an active-model readiness check (spec
    /// §7 Fatal case, SPEC_FULL supplement 2) and orphan recovery (spec
    /// §4.10). Idempotent: starting an already-running Coordinator is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut mode = self.mode.lock().unwrap();
            if matches!(*mode, CoordinatorMode::Running | CoordinatorMode::Starting) {
                return;
            }
            *mode = CoordinatorMode::Starting;
        }

        match self.readiness.check().await {
            Ok(Readiness::Ready) => {}
            Ok(Readiness::RequiresModel) => {
                *self.mode.lock().unwrap() = CoordinatorMode::RequiresModel;
                warn!("coordinator cannot start: no usable model is configured");
                return;
            }
            Err(err) => {
                *self.mode.lock().unwrap() = CoordinatorMode::Error;
                warn!(error = %err, "coordinator readiness check failed");
                return;
            }
        }

        if let Err(err) = self.pomodoro().check_orphaned_sessions().await {
            warn!(error = %err, "failed to reclaim orphaned pomodoro sessions at startup");
        }

        self.pause.set(false);
        self.keyboard.start();
        self.mouse.start();
        self.screenshot.start();
        *self.last_extraction_time.lock().unwrap() = Utc::now();
        *self.mode.lock().unwrap() = CoordinatorMode::Running;
        info!("coordinator started");
    }

    pub fn stop(&self) {
        self.keyboard.stop();
        self.mouse.stop();
        self.screenshot.stop();
        self.pause.set(true);
        *self.mode.lock().unwrap() = CoordinatorMode::Stopped;
        info!("coordinator stopped");
    }

    /// Idempotent (SPEC_FULL supplement 3): a repeated sleep signal
    /// does not double-pause the accounting, since pausing is a flag
    /// set, not a counter.
    pub fn on_sleep(&self) {
        self.pause.set(true);
    }

    pub fn on_wake(&self) {
        self.pause.set(false);
    }

    /// Installs `session_id` on all new records and disables the
    /// continuous extractor (spec §4.11). The continuous accumulator is
    /// flushed rather than carried into the phase (spec §9 Open
    /// Questions).
    pub fn enter_pomodoro_mode(&self, session_id: &str) {
        let mut state = self.pomodoro_state.lock().unwrap();
        *state = PomodoroState {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        };
        drop(state);

        let mut acc = self.accumulator.lock().unwrap();
        acc.screenshots.clear();
        acc.behavior_records.clear();
    }

    /// Clears the Pomodoro tag and re-enables continuous extraction.
    /// `enter; exit; enter` leaves the Coordinator in the same
    /// observable state as a single `enter` (spec §8 round-trip law):
    /// both reset the accumulator and start from an empty pending set.
    pub fn exit_pomodoro_mode(&self) {
        *self.pomodoro_state.lock().unwrap() = PomodoroState::default();
    }

    fn drain_receiver(&self, now: DateTime<Utc>) {
        let session_id = self.pomodoro_state.lock().unwrap().session_id.clone();
        let mut receiver = self.receiver.lock().unwrap();
        while let Ok(record) = receiver.try_recv() {
            self.buffer.add(record.with_session(session_id.clone()));
        }
        drop(receiver);
        self.buffer.drop_expired(now);
    }

    /// Periodic tick (spec §4.11, default 30s): drains capture, fetches
    /// `(last_processed_ts, now]` re-sorted by timestamp (spec §5),
    /// routes it to continuous extraction or the active Pomodoro
    /// session, and advances `last_processed_ts` on success. Ticks a
    /// separate ImageStore TTL sweep and the Pomodoro phase timer every
    /// call, matching the "lightweight scheduler runs on each tick"
    /// clause of spec §4.11.
    #[tracing::instrument(skip(self))]
    pub async fn tick_now(self: &Arc<Self>, now: DateTime<Utc>) {
        self.drain_receiver(now);
        self.image_store.cleanup_expired_memory();
        self.pomodoro().tick(now).await;

        if self.pause.is_paused() {
            return;
        }

        let last = *self.last_processed_ts.lock().unwrap();
        let window_start = last.unwrap_or(now - chrono::Duration::seconds(self.config.tick_interval_seconds));
        let mut records = self.buffer.records_in(window_start, now);
        if let Some(ts) = last {
            records.retain(|r| r.timestamp > ts);
        }
        records.sort_by_key(|r| r.timestamp);

        if records.is_empty() {
            return;
        }
        let max_ts = records.iter().map(|r| r.timestamp).max();

        let pomodoro_active = self.pomodoro_state.lock().unwrap().session_id.is_some();

        if pomodoro_active {
            self.pomodoro_state.lock().unwrap().pending.extend(records);
        } else {
            self.ingest_continuous(&records, now).await;
            self.maybe_run_session_aggregation(now).await;
        }

        if let Some(ts) = max_ts {
            *self.last_processed_ts.lock().unwrap() = Some(ts);
        }
    }

    /// RecordFilter -> ImageFilter -> accumulate (spec §4.4-§4.5, §4.8
    /// data flow), then checks the extraction trigger.
    async fn ingest_continuous(&self, records: &[RawRecord], now: DateTime<Utc>) {
        let merged = self.record_filter.merge(records);
        let (screenshots, behavior): (Vec<RawRecord>, Vec<RawRecord>) =
            merged.into_iter().partition(RawRecord::is_screenshot);

        let filtered = self.image_filter.process(&screenshots, &self.image_bytes_source);
        {
            let mut acc = self.accumulator.lock().unwrap();
            acc.screenshots.extend(filtered);
            acc.behavior_records.extend(behavior);
        }

        self.maybe_extract(now).await;
    }

    /// Trigger conditions (spec §4.8): `None` if none apply, otherwise
    /// whether this is a forced (>1.5x threshold) drain.
    fn accumulator_trigger(&self, now: DateTime<Utc>) -> Option<bool> {
        let acc = self.accumulator.lock().unwrap();
        if acc.screenshots.is_empty() {
            return None;
        }
        let count = acc.screenshots.len();
        let threshold = self.config.screenshot_threshold;
        let forced_threshold = (threshold as f64 * self.config.forced_drain_multiplier) as usize;
        drop(acc);

        let timed_out = {
            let last_extraction = *self.last_extraction_time.lock().unwrap();
            (now - last_extraction).num_seconds() >= self.config.max_accumulation_time_seconds
        };

        if count > forced_threshold {
            Some(true)
        } else if count >= threshold || timed_out {
            Some(false)
        } else {
            None
        }
    }

    /// Runs the two-step LLM extraction over whatever is accumulated,
    /// if a trigger condition holds (spec §4.8). Failures leave the
    /// accumulator untouched for the next tick to retry; the
    /// accumulator is cleared, and `last_extraction_time` advanced,
    /// only after a successful drain (including forced ones).
    async fn maybe_extract(&self, now: DateTime<Utc>) {
        let forced = match self.accumulator_trigger(now) {
            Some(forced) => forced,
            None => return,
        };
        if forced {
            warn!(
                threshold = self.config.screenshot_threshold,
                "accumulator forced drain past 1.5x screenshot_threshold"
            );
        }

        let (screenshots, behavior) = {
            let acc = self.accumulator.lock().unwrap();
            (acc.screenshots.clone(), acc.behavior_records.clone())
        };

        match self.run_extraction(&screenshots, &behavior).await {
            Ok(actions) => {
                {
                    let mut acc = self.accumulator.lock().unwrap();
                    acc.screenshots.clear();
                    acc.behavior_records.clear();
                }
                *self.last_extraction_time.lock().unwrap() = now;
                self.continuous_pending_actions.lock().unwrap().extend(actions);
            }
            Err(err) => {
                warn!(error = %err, "extraction failed this tick; accumulator retained for the next retry");
            }
        }
    }

    /// Sample -> RawAgent -> ActionAgent (spec §4.8 steps 1-5).
    async fn run_extraction(
        &self,
        screenshots: &[RawRecord],
        behavior_records: &[RawRecord],
    ) -> Result<Vec<Action>, PipelineError> {
        let selected = self.image_sampler.sample(screenshots);

        let mut behavior_input = selected.clone();
        behavior_input.extend(behavior_records.iter().cloned());
        let behavior = self.behavior_analyzer.analyze(&behavior_input);

        let scenes = self.raw_agent.extract_scenes(&selected, &behavior, &self.config.language).await?;
        let outcome = self
            .action_agent
            .extract_and_persist(&selected, &scenes, &behavior, self.store.as_ref(), &self.config.language)
            .await?;

        if !outcome.unreferenced_hashes.is_empty() {
            // Persisted but referenced by no saved action: left on disk
            // for the orphan sweep, eligible for ordinary LRU pressure
            // eviction from memory in the meantime (spec §4.8 step 5).
            tracing::debug!(count = outcome.unreferenced_hashes.len(), "pre-persisted hashes went unreferenced by any saved action");
        }

        Ok(outcome.actions)
    }

    /// Continuous-mode (non-Pomodoro) periodic action-to-activity
    /// aggregation, on `session_aggregation_interval_seconds` cadence
    /// (spec §6 Settings key `processing.session_aggregation_interval`).
    async fn maybe_run_session_aggregation(&self, now: DateTime<Utc>) {
        let due = {
            let last = *self.last_session_aggregation_time.lock().unwrap();
            (now - last).num_seconds() >= self.config.session_aggregation_interval_seconds
        };
        if !due {
            return;
        }

        let actions = {
            let mut pending = self.continuous_pending_actions.lock().unwrap();
            std::mem::take(&mut *pending)
        };
        *self.last_session_aggregation_time.lock().unwrap() = now;

        if actions.is_empty() {
            return;
        }

        if let Err(err) = self
            .session_agent
            .aggregate(&actions, self.store.as_ref(), &self.config.language, None)
            .await
        {
            warn!(error = %err, "continuous-mode session aggregation failed; actions dropped from this sweep");
        }
    }

    /// Force settlement (spec glossary): flushes every record pending
    /// for `session_id` through the continuous-mode extraction path,
    /// independent of the tick's own threshold/timeout triggers.
    async fn force_settlement(&self, session_id: &str, _now: DateTime<Utc>) -> usize {
        let pending = {
            let mut state = self.pomodoro_state.lock().unwrap();
            if state.session_id.as_deref() != Some(session_id) {
                return 0;
            }
            std::mem::take(&mut state.pending)
        };
        if pending.is_empty() {
            return 0;
        }

        let merged = self.record_filter.merge(&pending);
        let (screenshots, behavior): (Vec<RawRecord>, Vec<RawRecord>) =
            merged.into_iter().partition(RawRecord::is_screenshot);
        let filtered = self.image_filter.process(&screenshots, &self.image_bytes_source);

        if filtered.is_empty() {
            return 0;
        }

        match self.run_extraction(&filtered, &behavior).await {
            Ok(actions) => {
                let count = actions.len();
                let mut state = self.pomodoro_state.lock().unwrap();
                if state.session_id.as_deref() == Some(session_id) {
                    state.actions.extend(actions);
                }
                count
            }
            Err(err) => {
                warn!(session_id, error = %err, "force settlement extraction failed");
                0
            }
        }
    }

    /// SessionAgent clustering over this session's Actions captured in
    /// `[phase_start, phase_end)` (spec §4.10, §4.9).
    async fn aggregate_work_phase(
        &self,
        session_id: &str,
        phase_number: u32,
        phase_start: DateTime<Utc>,
        phase_end: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        let phase_actions: Vec<Action> = {
            let state = self.pomodoro_state.lock().unwrap();
            if state.session_id.as_deref() != Some(session_id) {
                return Err(PipelineError::NoActionsFound);
            }
            state
                .actions
                .iter()
                .filter(|a| a.timestamp >= phase_start && a.timestamp < phase_end)
                .cloned()
                .collect()
        };

        let activities = self
            .session_agent
            .aggregate(
                &phase_actions,
                self.store.as_ref(),
                &self.config.language,
                Some((session_id.to_string(), phase_number)),
            )
            .await?;

        let count = activities.len();
        let mut state = self.pomodoro_state.lock().unwrap();
        if state.session_id.as_deref() == Some(session_id) {
            state.activities.extend(activities);
        }
        Ok(count)
    }

    /// Session-level focus evaluation (spec §4.10): averages the
    /// per-activity focus scores the SessionAgent already computed
    /// during `aggregate_work_phase` (spec §4.9 "Focus score policy").
    /// `None` when no activity was produced for the session.
    async fn evaluate_session_focus(&self, session_id: &str) -> Option<LlmEvaluation> {
        let (action_count, activities) = {
            let state = self.pomodoro_state.lock().unwrap();
            if state.session_id.as_deref() != Some(session_id) {
                return None;
            }
            (state.actions.len(), state.activities.clone())
        };
        if activities.is_empty() {
            return None;
        }

        let scores: Vec<u8> = activities.iter().filter_map(|a| a.focus_score).collect();
        if scores.is_empty() {
            return None;
        }
        let average = scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64;

        Some(LlmEvaluation {
            summary: format!(
                "{} activities clustered from {} actions across the session",
                activities.len(),
                action_count
            ),
            focus_score: average.round().clamp(0.0, 100.0) as u8,
            computed_at: Utc::now(),
        })
    }
}

/// Adapter implementing [`PomodoroRuntime`] against the owning
/// Coordinator, resolving the cyclic ownership between the two (spec §9).
struct CoordinatorRuntime(Arc<Coordinator>);

#[async_trait]
impl PomodoroRuntime for CoordinatorRuntime {
    fn enter_pomodoro_mode(&self, session_id: &str) {
        self.0.enter_pomodoro_mode(session_id);
    }

    fn exit_pomodoro_mode(&self) {
        self.0.exit_pomodoro_mode();
    }

    async fn stop_perception(&self) {
        self.0.pause.set(true);
    }

    async fn resume_perception(&self) {
        self.0.pause.set(false);
    }

    async fn force_settlement(&self, session_id: &str, now: DateTime<Utc>) -> usize {
        self.0.force_settlement(session_id, now).await
    }

    async fn aggregate_work_phase(
        &self,
        session_id: &str,
        phase_number: u32,
        phase_start: DateTime<Utc>,
        phase_end: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        self.0.aggregate_work_phase(session_id, phase_number, phase_start, phase_end).await
    }

    async fn evaluate_session_focus(&self, session_id: &str) -> Option<LlmEvaluation> {
        self.0.evaluate_session_focus(session_id).await
    }
}
