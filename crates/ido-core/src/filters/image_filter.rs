//! ImageFilter — per-image dedup, scene-aware thresholding, content
//! gating, and compression (spec §4.4).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView};

use crate::image_store::hash::MultiHash;
use crate::record::{RawRecord, RawRecordData};

const DEFAULT_CACHE_SIZE: usize = 10;
const DEFAULT_MIN_SAMPLE_INTERVAL_SECONDS: i64 = 30;
const DEFAULT_NORMAL_SIMILARITY_THRESHOLD: f64 = 0.90;
const CODING_SIMILARITY_THRESHOLD: f64 = 0.92;
const STATIC_SIMILARITY_THRESHOLD: f64 = 0.85;
const VIDEO_SIMILARITY_THRESHOLD: f64 = 0.98;
const STATIC_CLASSIFY_THRESHOLD: f64 = 0.99;
const VIDEO_CLASSIFY_THRESHOLD: f64 = 0.95;
const DEFAULT_VARIANCE_THRESHOLD: f64 = 60.0;
const DEFAULT_EDGE_DENSITY_THRESHOLD: f64 = 0.02;
const DEFAULT_COMPRESSION_QUALITY: u8 = 75;

fn default_coding_identifiers() -> Vec<String> {
    [
        "code", "vscode", "visual studio code", "terminal", "iterm", "vim", "nvim", "xcode",
        "intellij", "pycharm", "webstorm", "goland", "rider", "warp", "alacritty", "kitty",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Scene classification an incoming screenshot is bucketed into before
/// its drop threshold is chosen (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    Coding,
    Static,
    Video,
    Normal,
}

impl Scene {
    fn similarity_threshold(self, normal_threshold: f64) -> f64 {
        match self {
            Scene::Coding => CODING_SIMILARITY_THRESHOLD,
            Scene::Static => STATIC_SIMILARITY_THRESHOLD,
            Scene::Video => VIDEO_SIMILARITY_THRESHOLD,
            Scene::Normal => normal_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageFilterConfig {
    pub cache_size: usize,
    pub min_sample_interval_seconds: i64,
    pub normal_similarity_threshold: f64,
    pub variance_threshold: f64,
    pub edge_density_threshold: f64,
    pub compression_quality: u8,
    pub coding_window_identifiers: Vec<String>,
}

impl Default for ImageFilterConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            min_sample_interval_seconds: DEFAULT_MIN_SAMPLE_INTERVAL_SECONDS,
            normal_similarity_threshold: DEFAULT_NORMAL_SIMILARITY_THRESHOLD,
            variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
            edge_density_threshold: DEFAULT_EDGE_DENSITY_THRESHOLD,
            compression_quality: DEFAULT_COMPRESSION_QUALITY,
            coding_window_identifiers: default_coding_identifiers(),
        }
    }
}

/// Named drop counters (spec §4.4: "every dropped record increments a
/// named counter").
#[derive(Debug, Default)]
pub struct FilterCounters {
    pub duplicate: AtomicU64,
    pub content_gate: AtomicU64,
    pub load_failed: AtomicU64,
}

impl FilterCounters {
    pub fn duplicate(&self) -> u64 {
        self.duplicate.load(Ordering::Relaxed)
    }
    pub fn content_gate(&self) -> u64 {
        self.content_gate.load(Ordering::Relaxed)
    }
    pub fn load_failed(&self) -> u64 {
        self.load_failed.load(Ordering::Relaxed)
    }
}

/// Supplies the raw bytes an image hash refers to, whether from an
/// embedded capture payload or an [`crate::image_store::ImageStore`]
/// lookup (spec §4.4 step 1); production wiring picks the source, tests
/// can stub it directly.
pub trait ImageBytesSource: Send + Sync {
    fn load(&self, hash: &str) -> Option<Vec<u8>>;
}

struct CacheEntry {
    timestamp: DateTime<Utc>,
    hash: MultiHash,
}

#[derive(Default)]
struct FilterState {
    cache: VecDeque<CacheEntry>,
    last_kept_timestamp: Option<DateTime<Utc>>,
}

pub struct ImageFilter {
    config: ImageFilterConfig,
    state: Mutex<FilterState>,
    counters: FilterCounters,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new(ImageFilterConfig::default())
    }
}

impl ImageFilter {
    pub fn new(config: ImageFilterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(FilterState::default()),
            counters: FilterCounters::default(),
        }
    }

    pub fn counters(&self) -> &FilterCounters {
        &self.counters
    }

    /// Runs the dedup/content-gate/compress pipeline over `records`,
    /// preserving input order. Non-screenshot records pass through
    /// untouched and uncounted.
    pub fn process(&self, records: &[RawRecord], source: &dyn ImageBytesSource) -> Vec<RawRecord> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let RawRecordData::Screenshot(shot) = &record.data else {
                out.push(record.clone());
                continue;
            };

            let Some(bytes) = source.load(&shot.hash) else {
                self.counters.load_failed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            let Ok(img) = image::load_from_memory(&bytes) else {
                self.counters.load_failed.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let multi_hash = MultiHash::compute(&img);
            let scene = self.classify_scene(&multi_hash, shot.active_window.as_deref());

            if !self.should_keep(&multi_hash, scene, record.timestamp) {
                self.counters.duplicate.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if !self.passes_content_gate(&img, scene) {
                self.counters.content_gate.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            self.remember(record.timestamp, multi_hash);

            let mut kept = record.clone();
            if let RawRecordData::Screenshot(kept_shot) = &mut kept.data {
                kept_shot.optimized_image = Some(
                    compress_to_base64(&img, self.config.compression_quality)
                        .unwrap_or_else(|| STANDARD.encode(&bytes)),
                );
            }
            out.push(kept);
        }
        out
    }

    fn classify_scene(&self, multi_hash: &MultiHash, active_window: Option<&str>) -> Scene {
        if let Some(window) = active_window {
            let lower = window.to_lowercase();
            if self
                .config
                .coding_window_identifiers
                .iter()
                .any(|id| lower.contains(id.as_str()))
            {
                return Scene::Coding;
            }
        }
        let max_similarity = self.max_cache_similarity(multi_hash);
        if max_similarity >= STATIC_CLASSIFY_THRESHOLD {
            Scene::Static
        } else if max_similarity >= VIDEO_CLASSIFY_THRESHOLD {
            Scene::Video
        } else {
            Scene::Normal
        }
    }

    fn max_cache_similarity(&self, multi_hash: &MultiHash) -> f64 {
        let state = self.state.lock().unwrap();
        state
            .cache
            .iter()
            .map(|entry| entry.hash.similarity(multi_hash))
            .fold(0.0, f64::max)
    }

    /// Applies the scene-specific duplicate threshold, with the
    /// periodic-sampling override (spec §4.4 step 2).
    fn should_keep(&self, multi_hash: &MultiHash, scene: Scene, at: DateTime<Utc>) -> bool {
        let state = self.state.lock().unwrap();
        if let Some(last_kept) = state.last_kept_timestamp {
            if (at - last_kept).num_seconds() >= self.config.min_sample_interval_seconds {
                return true;
            }
        } else {
            return true;
        }
        let max_similarity = state
            .cache
            .iter()
            .map(|entry| entry.hash.similarity(multi_hash))
            .fold(0.0, f64::max);
        max_similarity < scene.similarity_threshold(self.config.normal_similarity_threshold)
    }

    fn passes_content_gate(&self, img: &DynamicImage, scene: Scene) -> bool {
        let (variance, edge_density) = luma_stats(img);
        let relax = if scene == Scene::Coding { 0.5 } else { 1.0 };
        variance >= self.config.variance_threshold * relax
            || edge_density >= self.config.edge_density_threshold * relax
    }

    fn remember(&self, at: DateTime<Utc>, hash: MultiHash) {
        let mut state = self.state.lock().unwrap();
        state.cache.push_back(CacheEntry { timestamp: at, hash });
        while state.cache.len() > self.config.cache_size {
            state.cache.pop_front();
        }
        state.last_kept_timestamp = Some(at);
    }
}

/// Mean variance and edge density of the luma channel, used by the
/// content gate to reject blank/static screenshots (spec §4.4 step 3).
fn luma_stats(img: &DynamicImage) -> (f64, f64) {
    let small = img.resize(160, 160, image::imageops::FilterType::Triangle).to_luma8();
    let (w, h) = small.dimensions();
    if w < 2 || h < 2 {
        return (0.0, 0.0);
    }
    let pixels: Vec<f64> = small.pixels().map(|p| p.0[0] as f64).collect();
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
    let variance = pixels.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / pixels.len() as f64;

    let mut edge_count = 0u32;
    for y in 0..h {
        for x in 0..w - 1 {
            let left = small.get_pixel(x, y).0[0] as i32;
            let right = small.get_pixel(x + 1, y).0[0] as i32;
            if (left - right).abs() > 20 {
                edge_count += 1;
            }
        }
    }
    let edge_density = edge_count as f64 / ((w - 1) * h) as f64;
    (variance, edge_density)
}

fn compress_to_base64(img: &DynamicImage, quality: u8) -> Option<String> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
        .ok()?;
    Some(STANDARD.encode(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ScreenshotData;
    use image::ImageEncoder;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeSource(StdMutex<HashMap<String, Vec<u8>>>);
    impl ImageBytesSource for FakeSource {
        fn load(&self, hash: &str) -> Option<Vec<u8>> {
            self.0.lock().unwrap().get(hash).cloned()
        }
    }

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

    fn shot_record(hash: &str, at: DateTime<Utc>, active_window: Option<&str>) -> RawRecord {
        RawRecord::new(
            at,
            RawRecordData::Screenshot(ScreenshotData {
                hash: hash.to_string(),
                monitor_index: 0,
                width: 64,
                height: 64,
                optimized_image: None,
                active_window: active_window.map(str::to_string),
            }),
        )
    }

    #[test]
    fn empty_cache_keeps_a_single_image() {
        let filter = ImageFilter::default();
        let mut bytes = HashMap::new();
        bytes.insert("a".to_string(), noisy_jpeg(1));
        let source = FakeSource(StdMutex::new(bytes));
        let out = filter.process(&[shot_record("a", Utc::now(), None)], &source);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn identical_image_is_dropped_as_duplicate() {
        let filter = ImageFilter::default();
        let mut bytes = HashMap::new();
        bytes.insert("a".to_string(), noisy_jpeg(7));
        bytes.insert("b".to_string(), noisy_jpeg(7));
        let source = FakeSource(StdMutex::new(bytes));
        let t0 = Utc::now();
        let records = vec![
            shot_record("a", t0, None),
            shot_record("b", t0 + chrono::Duration::seconds(1), None),
        ];
        let out = filter.process(&records, &source);
        assert_eq!(out.len(), 1);
        assert_eq!(filter.counters().duplicate(), 1);
    }

    #[test]
    fn periodic_sampling_overrides_duplicate_threshold() {
        let filter = ImageFilter::new(ImageFilterConfig {
            min_sample_interval_seconds: 5,
            ..Default::default()
        });
        let mut bytes = HashMap::new();
        bytes.insert("a".to_string(), noisy_jpeg(3));
        bytes.insert("b".to_string(), noisy_jpeg(3));
        let source = FakeSource(StdMutex::new(bytes));
        let t0 = Utc::now();
        let records = vec![
            shot_record("a", t0, None),
            shot_record("b", t0 + chrono::Duration::seconds(10), None),
        ];
        let out = filter.process(&records, &source);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn missing_bytes_are_counted_as_load_failed() {
        let filter = ImageFilter::default();
        let source = FakeSource(StdMutex::new(HashMap::new()));
        let out = filter.process(&[shot_record("missing", Utc::now(), None)], &source);
        assert!(out.is_empty());
        assert_eq!(filter.counters().load_failed(), 1);
    }

    #[test]
    fn coding_window_is_classified_as_coding_scene() {
        let filter = ImageFilter::default();
        let mut bytes = HashMap::new();
        bytes.insert("a".to_string(), noisy_jpeg(9));
        let source = FakeSource(StdMutex::new(bytes));
        let out = filter.process(&[shot_record("a", Utc::now(), Some("Visual Studio Code"))], &source);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn kept_record_gets_an_optimized_image() {
        let filter = ImageFilter::default();
        let mut bytes = HashMap::new();
        bytes.insert("a".to_string(), noisy_jpeg(5));
        let source = FakeSource(StdMutex::new(bytes));
        let out = filter.process(&[shot_record("a", Utc::now(), None)], &source);
        if let RawRecordData::Screenshot(s) = &out[0].data {
            assert!(s.optimized_image.is_some());
        } else {
            panic!("expected screenshot");
        }
    }
}
