//! ScreenshotCapture — Coordinator-driven periodic capture (spec §4.2).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use image::ImageEncoder;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use super::ActiveMonitorTracker;
use crate::image_store::hash::content_hash;
use crate::image_store::ImageStore;
use crate::record::{RawRecord, RawRecordData, ScreenshotData};

const MAX_CAPTURE_DIMENSION: u32 = 2560;
const DEFAULT_FORCE_SAVE_INTERVAL_SECONDS: i64 = 60;

/// A raw grab before any ImageFilter processing.
pub struct ScreenshotFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// OS-level screen grabbing, injected so the capture loop is testable
/// without a real display (spec §1: capture backends are collaborators).
pub trait ScreenGrabber: Send + Sync {
    fn grab(&self, monitor_index: u32) -> Option<ScreenshotFrame>;
}

/// Which monitors are enabled for capture.
pub trait MonitorSet: Send + Sync {
    fn enabled_monitors(&self) -> Vec<u32>;
}

/// Active window title/bundle enrichment, best-effort (spec §4.2).
pub trait ActiveWindowProvider: Send + Sync {
    fn active_window(&self, monitor_index: u32) -> Option<String>;
}

struct MonitorState {
    last_hash: String,
    last_forced_at: DateTime<Utc>,
}

pub struct ScreenshotCapture {
    sender: UnboundedSender<RawRecord>,
    grabber: Arc<dyn ScreenGrabber>,
    monitors: Arc<dyn MonitorSet>,
    active_window: Option<Arc<dyn ActiveWindowProvider>>,
    active_monitor: Arc<ActiveMonitorTracker>,
    image_store: Arc<ImageStore>,
    smart_capture_enabled: bool,
    force_save_interval_seconds: i64,
    monitor_state: Mutex<HashMap<u32, MonitorState>>,
}

impl ScreenshotCapture {
    pub fn new(
        sender: UnboundedSender<RawRecord>,
        grabber: Arc<dyn ScreenGrabber>,
        monitors: Arc<dyn MonitorSet>,
        active_monitor: Arc<ActiveMonitorTracker>,
        image_store: Arc<ImageStore>,
    ) -> Self {
        Self {
            sender,
            grabber,
            monitors,
            active_window: None,
            active_monitor,
            image_store,
            smart_capture_enabled: true,
            force_save_interval_seconds: DEFAULT_FORCE_SAVE_INTERVAL_SECONDS,
            monitor_state: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_active_window_provider(mut self, provider: Arc<dyn ActiveWindowProvider>) -> Self {
        self.active_window = Some(provider);
        self
    }

    pub fn with_smart_capture(mut self, enabled: bool) -> Self {
        self.smart_capture_enabled = enabled;
        self
    }

    pub fn with_force_save_interval_seconds(mut self, seconds: i64) -> Self {
        self.force_save_interval_seconds = seconds;
        self
    }

    /// One capture tick (spec §4.2): resolves the monitor set, grabs
    /// each, scales down oversized frames, dedups per-monitor against
    /// the previous hash and the force-save interval, and emits a
    /// screenshot RawRecord for everything kept. Returns the records
    /// emitted this tick.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<RawRecord> {
        let monitors = if self.smart_capture_enabled {
            match self.active_monitor.active_monitor() {
                Some(active) => vec![active],
                None => self.monitors.enabled_monitors(),
            }
        } else {
            self.monitors.enabled_monitors()
        };

        let mut emitted = Vec::new();
        for monitor_index in monitors {
            let Some(frame) = self.grabber.grab(monitor_index) else {
                continue;
            };
            let (width, height, bytes) = shrink_if_needed(frame);
            let hash = content_hash(&bytes);

            if self.should_drop(monitor_index, &hash, now) {
                continue;
            }

            if let Err(e) = self.image_store.put(&hash, &bytes) {
                warn!(hash, error = %e, "failed to persist raw screenshot bytes for a kept frame");
            }

            let active_window = self
                .active_window
                .as_ref()
                .and_then(|p| p.active_window(monitor_index));

            let record = RawRecord::new(
                now,
                RawRecordData::Screenshot(ScreenshotData {
                    hash,
                    monitor_index,
                    width,
                    height,
                    optimized_image: None,
                    active_window,
                }),
            );
            let _ = self.sender.send(record.clone());
            emitted.push(record);
        }
        emitted
    }

    fn should_drop(&self, monitor_index: u32, hash: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.monitor_state.lock().unwrap();
        match state.get_mut(&monitor_index) {
            Some(existing) if existing.last_hash == hash => {
                let since_forced = (now - existing.last_forced_at).num_seconds();
                if since_forced < self.force_save_interval_seconds {
                    true
                } else {
                    existing.last_forced_at = now;
                    false
                }
            }
            _ => {
                state.insert(
                    monitor_index,
                    MonitorState { last_hash: hash.to_string(), last_forced_at: now },
                );
                false
            }
        }
    }
}

fn shrink_if_needed(frame: ScreenshotFrame) -> (u32, u32, Vec<u8>) {
    if frame.width <= MAX_CAPTURE_DIMENSION && frame.height <= MAX_CAPTURE_DIMENSION {
        return (frame.width, frame.height, frame.bytes);
    }
    match image::load_from_memory(&frame.bytes) {
        Ok(img) => {
            let scaled = img.resize(
                MAX_CAPTURE_DIMENSION,
                MAX_CAPTURE_DIMENSION,
                image::imageops::FilterType::Triangle,
            );
            let mut buf = Vec::new();
            let rgb = scaled.to_rgb8();
            if image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
                .is_ok()
            {
                (rgb.width(), rgb.height(), buf)
            } else {
                (frame.width, frame.height, frame.bytes)
            }
        }
        Err(_) => (frame.width, frame.height, frame.bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageEncoder;

    struct FixedFrame(Vec<u8>, u32, u32);

    impl ScreenGrabber for FixedFrame {
        fn grab(&self, _monitor_index: u32) -> Option<ScreenshotFrame> {
            Some(ScreenshotFrame { bytes: self.0.clone(), width: self.1, height: self.2 })
        }
    }

    struct AllMonitors(Vec<u32>);
    impl MonitorSet for AllMonitors {
        fn enabled_monitors(&self) -> Vec<u32> {
            self.0.clone()
        }
    }

    fn small_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
            .write_image(img.as_raw(), 8, 8, image::ExtendedColorType::Rgb8)
            .unwrap();
        buf
    }

    fn image_store() -> Arc<ImageStore> {
        Arc::new(ImageStore::new(tempfile::tempdir().unwrap().into_path()).unwrap())
    }

    #[test]
    fn repeated_identical_frame_is_dropped_within_force_interval() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let capture = ScreenshotCapture::new(
            tx,
            Arc::new(FixedFrame(small_jpeg(), 8, 8)),
            Arc::new(AllMonitors(vec![0])),
            Arc::new(ActiveMonitorTracker::new()),
            image_store(),
        )
        .with_smart_capture(false)
        .with_force_save_interval_seconds(60);

        let t0 = Utc::now();
        capture.tick(t0);
        capture.tick(t0 + chrono::Duration::seconds(1));
        assert_eq!(rx.try_recv().is_ok(), true);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn smart_capture_prefers_the_active_monitor() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let active_monitor = Arc::new(ActiveMonitorTracker::new());
        active_monitor.on_mouse_position(3, Utc::now());
        let capture = ScreenshotCapture::new(
            tx,
            Arc::new(FixedFrame(small_jpeg(), 8, 8)),
            Arc::new(AllMonitors(vec![0, 1, 2])),
            Arc::clone(&active_monitor),
            image_store(),
        );
        let emitted = capture.tick(Utc::now());
        assert_eq!(emitted.len(), 1);
        assert!(matches!(&emitted[0].data, RawRecordData::Screenshot(s) if s.monitor_index == 3));
    }
}
