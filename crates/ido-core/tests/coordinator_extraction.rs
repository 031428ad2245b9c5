//! Drives a full `Coordinator` through the continuous-mode extraction
//! triggers (count threshold, forced drain) and a Pomodoro mode switch,
//! using real screenshot bytes through the real `ImageStore`/`ImageFilter`
//! so the whole capture -> filter -> LLM -> persisted-action path runs.

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use image::ImageEncoder;

use ido_core::coordinator::{AlwaysReady, Coordinator, CoordinatorConfig, CoordinatorDeps};
use ido_core::events::NullEventBus;
use ido_core::image_store::ImageStore;
use ido_core::perception::{
    ActiveMonitorTracker, KeyboardCapture, MouseCapture, MonitorSet, PauseFlag, ScreenGrabber, ScreenStateMonitor,
    ScreenshotCapture, ScreenshotFrame,
};
use ido_core::record::{RawRecord, RawRecordData, ScreenshotData};

use support::{FixedPromptProvider, InMemoryStore, ScriptedLlmClient};

fn noisy_jpeg(seed: u8) -> Vec<u8> {
    let mut img = image::RgbImage::new(64, 64);
    for (i, pixel) in img.pixels_mut().enumerate() {
        let v = ((i as u32 * 37 + seed as u32 * 91) % 256) as u8;
        *pixel = image::Rgb([v, v.wrapping_add(seed), v.wrapping_sub(seed)]);
    }
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
        .write_image(img.as_raw(), 64, 64, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

struct NoGrab;
impl ScreenGrabber for NoGrab {
    fn grab(&self, _monitor_index: u32) -> Option<ScreenshotFrame> {
        None
    }
}
struct NoMonitors;
impl MonitorSet for NoMonitors {
    fn enabled_monitors(&self) -> Vec<u32> {
        Vec::new()
    }
}

fn scenes_json(count: usize) -> String {
    let entries: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"screenshot_index":{i},"visual_summary":"writing code","inferred_activity":"coding"}}"#))
        .collect();
    format!("[{}]", entries.join(","))
}

fn actions_json(scene_indexes: &[usize]) -> String {
    let idx: Vec<String> = scene_indexes.iter().map(|i| i.to_string()).collect();
    format!(
        r#"[{{"title":"write the module","description":"editing source files","keywords":["coding"],"scene_index":[{}]}}]"#,
        idx.join(",")
    )
}

struct Harness {
    coordinator: Arc<Coordinator>,
    tx: tokio::sync::mpsc::UnboundedSender<RawRecord>,
    image_store: Arc<ImageStore>,
    store: Arc<InMemoryStore>,
}

fn build_harness(config: CoordinatorConfig, llm_responses: Vec<&str>) -> Harness {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let pause = PauseFlag::new();
    let active_monitor = Arc::new(ActiveMonitorTracker::new());
    let image_store = Arc::new(ImageStore::new(tempfile::tempdir().unwrap().into_path()).unwrap());

    let keyboard = Arc::new(KeyboardCapture::new(tx.clone(), pause.clone(), active_monitor.clone()));
    let mouse = Arc::new(MouseCapture::new(tx.clone(), pause.clone(), active_monitor.clone()));
    let screenshot = Arc::new(ScreenshotCapture::new(
        tx.clone(),
        Arc::new(NoGrab),
        Arc::new(NoMonitors),
        active_monitor.clone(),
        image_store.clone(),
    ));
    let screen_state = Arc::new(ScreenStateMonitor::new(pause.clone()));
    let store = Arc::new(InMemoryStore::default());

    let deps = CoordinatorDeps {
        pause,
        receiver: rx,
        keyboard,
        mouse,
        screenshot,
        screen_state,
        active_monitor,
        image_store: image_store.clone(),
        store: store.clone(),
        llm: Arc::new(ScriptedLlmClient::new(llm_responses)),
        prompts: Arc::new(FixedPromptProvider),
        readiness: Arc::new(AlwaysReady),
        config,
    };

    let coordinator = Coordinator::new(deps, Arc::new(NullEventBus));
    Harness { coordinator, tx, image_store, store }
}

fn push_screenshot(h: &Harness, seed: u8, at: chrono::DateTime<Utc>) {
    let bytes = noisy_jpeg(seed);
    let hash = format!("seed-{seed}");
    h.image_store.put(&hash, &bytes).unwrap();
    let record = RawRecord::new(
        at,
        RawRecordData::Screenshot(ScreenshotData {
            hash,
            monitor_index: 0,
            width: 64,
            height: 64,
            optimized_image: None,
            active_window: None,
        }),
    );
    let _ = h.tx.send(record);
}

#[tokio::test]
async fn accumulator_reaching_the_count_threshold_triggers_extraction() {
    let config = CoordinatorConfig {
        screenshot_threshold: 3,
        forced_drain_multiplier: 1.5,
        max_accumulation_time_seconds: 3600,
        session_aggregation_interval_seconds: 999_999,
        ..Default::default()
    };
    let h = build_harness(config, vec![&scenes_json(3), &actions_json(&[0, 1, 2])]);
    h.coordinator.start().await;

    let t0 = Utc::now();
    for i in 0..3u8 {
        push_screenshot(&h, i + 1, t0 + Duration::seconds(i as i64 * 31));
    }

    h.coordinator.tick_now(t0 + Duration::seconds(120)).await;

    let actions = h.store.actions.lock().unwrap();
    assert_eq!(actions.len(), 1, "three distinct screenshots at threshold should drain into one action");
    let snapshot = h.coordinator.snapshot();
    assert_eq!(snapshot.accumulated_screenshots, 0, "accumulator is cleared after a successful drain");
}

#[tokio::test]
async fn accumulator_below_threshold_and_within_timeout_does_not_extract() {
    let config = CoordinatorConfig {
        screenshot_threshold: 5,
        max_accumulation_time_seconds: 3600,
        session_aggregation_interval_seconds: 999_999,
        ..Default::default()
    };
    let h = build_harness(config, vec![&scenes_json(2), &actions_json(&[0, 1])]);
    h.coordinator.start().await;

    let t0 = Utc::now();
    push_screenshot(&h, 1, t0);
    push_screenshot(&h, 2, t0 + Duration::seconds(31));

    h.coordinator.tick_now(t0 + Duration::seconds(60)).await;

    assert!(h.store.actions.lock().unwrap().is_empty());
    assert_eq!(h.coordinator.snapshot().accumulated_screenshots, 2);
}

#[tokio::test]
async fn forced_drain_fires_past_one_and_a_half_times_threshold() {
    let config = CoordinatorConfig {
        screenshot_threshold: 2,
        forced_drain_multiplier: 1.5,
        max_accumulation_time_seconds: 3600,
        session_aggregation_interval_seconds: 999_999,
        ..Default::default()
    };
    // threshold=2 -> forced_threshold=3; pushing 4 distinct screenshots
    // in one tick must force a drain even though nothing timed out.
    let h = build_harness(config, vec![&scenes_json(4), &actions_json(&[0, 1, 2, 3])]);
    h.coordinator.start().await;

    let t0 = Utc::now();
    for i in 0..4u8 {
        push_screenshot(&h, i + 10, t0 + Duration::seconds(i as i64 * 31));
    }

    h.coordinator.tick_now(t0 + Duration::seconds(200)).await;

    assert_eq!(h.store.actions.lock().unwrap().len(), 1);
    assert_eq!(h.coordinator.snapshot().accumulated_screenshots, 0);
}

#[tokio::test]
async fn entering_pomodoro_mode_clears_the_continuous_accumulator() {
    let config = CoordinatorConfig {
        screenshot_threshold: 10,
        max_accumulation_time_seconds: 3600,
        session_aggregation_interval_seconds: 999_999,
        ..Default::default()
    };
    let h = build_harness(config, vec![]);
    h.coordinator.start().await;

    let t0 = Utc::now();
    push_screenshot(&h, 1, t0);
    h.coordinator.tick_now(t0 + Duration::seconds(5)).await;
    assert_eq!(h.coordinator.snapshot().accumulated_screenshots, 1);

    h.coordinator.enter_pomodoro_mode("session-x");
    assert_eq!(h.coordinator.snapshot().accumulated_screenshots, 0);
}
