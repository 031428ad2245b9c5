//! ImageStore — content-addressed, two-tier (memory + disk) thumbnail
//! cache with TTL and LRU (spec §4.1).

mod entry;
pub mod hash;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use tracing::warn;

pub use entry::ImageEntry;
use entry::MemoryCache;

use crate::error::ImageStoreError;

const JPEG_QUALITY: u8 = 75;
const MAX_DIMENSION: u32 = 1440;
const SCALE_FACTOR: f64 = 0.75;
const DEFAULT_MEMORY_CACHE_SIZE: usize = 500;
const DEFAULT_MEMORY_TTL_SECONDS: i64 = 180;

pub struct ImageStore {
    memory: Mutex<MemoryCache>,
    disk_dir: PathBuf,
    memory_cache_size: usize,
    memory_ttl_seconds: i64,
}

impl ImageStore {
    pub fn new(disk_dir: impl Into<PathBuf>) -> Result<Self, ImageStoreError> {
        Self::with_config(disk_dir, DEFAULT_MEMORY_CACHE_SIZE, DEFAULT_MEMORY_TTL_SECONDS)
    }

    pub fn with_config(
        disk_dir: impl Into<PathBuf>,
        memory_cache_size: usize,
        memory_ttl_seconds: i64,
    ) -> Result<Self, ImageStoreError> {
        if memory_ttl_seconds < 120 {
            warn!(memory_ttl_seconds, "image memory TTL below the recommended 120s floor");
        }
        let disk_dir = disk_dir.into();
        std::fs::create_dir_all(&disk_dir)
            .map_err(|e| ImageStoreError::NoCacheDir(e.to_string()))?;
        Ok(Self {
            memory: Mutex::new(MemoryCache::default()),
            disk_dir,
            memory_cache_size,
            memory_ttl_seconds,
        })
    }

    fn disk_path(&self, hash: &str) -> PathBuf {
        self.disk_dir.join(format!("{hash}.jpg"))
    }

    /// Derives a thumbnail and inserts it into memory and disk
    /// (spec §4.1). The in-memory copy is written first so a disk
    /// failure never loses the record; `put` still returns an error in
    /// that case and the hash must not be referenced by a persisted
    /// Action until a later `persist_batch` succeeds.
    pub fn put(&self, hash: &str, image_bytes: &[u8]) -> Result<(), ImageStoreError> {
        {
            let mut memory = self.memory.lock().unwrap();
            if memory.contains(hash) {
                // Concurrent put with the same hash is a no-op (spec §4.1).
                return Ok(());
            }
        }

        let thumbnail = encode_thumbnail(image_bytes).map_err(|e| ImageStoreError::DecodeFailed {
            hash: hash.to_string(),
            message: e.to_string(),
        })?;
        let base64_thumbnail = STANDARD.encode(&thumbnail);
        let now = Utc::now();

        {
            let mut memory = self.memory.lock().unwrap();
            memory.insert(
                hash.to_string(),
                ImageEntry {
                    base64_thumbnail: base64_thumbnail.clone(),
                    captured_at: now,
                    persisted: false,
                },
            );
            self.evict_under_pressure(&mut memory);
        }

        match std::fs::write(self.disk_path(hash), &thumbnail) {
            Ok(()) => {
                let mut memory = self.memory.lock().unwrap();
                if let Some(entry) = memory.peek_mut(hash) {
                    entry.persisted = true;
                }
                Ok(())
            }
            Err(e) => {
                warn!(hash, error = %e, "failed to persist thumbnail to disk, keeping memory-only copy");
                Err(ImageStoreError::DiskWriteFailed {
                    hash: hash.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Memory first, then disk; a disk hit is promoted into memory.
    pub fn get(&self, hash: &str) -> Option<String> {
        {
            let mut memory = self.memory.lock().unwrap();
            if let Some(entry) = memory.get(hash) {
                return Some(entry.base64_thumbnail.clone());
            }
        }

        let path = self.disk_path(hash);
        let bytes = std::fs::read(&path).ok()?;
        let base64_thumbnail = STANDARD.encode(&bytes);
        let mut memory = self.memory.lock().unwrap();
        memory.insert(
            hash.to_string(),
            ImageEntry {
                base64_thumbnail: base64_thumbnail.clone(),
                captured_at: Utc::now(),
                persisted: true,
            },
        );
        self.evict_under_pressure(&mut memory);
        Some(base64_thumbnail)
    }

    /// Idempotently ensures every hash has an on-disk copy. Fails for a
    /// hash iff it is in neither memory nor on disk (spec §4.1, §8).
    pub fn persist_batch(&self, hashes: &[String]) -> HashMap<String, bool> {
        let mut results = HashMap::with_capacity(hashes.len());
        for hash in hashes {
            results.insert(hash.clone(), self.ensure_persisted(hash));
        }
        results
    }

    fn ensure_persisted(&self, hash: &str) -> bool {
        if self.disk_path(hash).exists() {
            let mut memory = self.memory.lock().unwrap();
            if let Some(entry) = memory.peek_mut(hash) {
                entry.persisted = true;
            }
            return true;
        }

        let base64_thumbnail = {
            let memory = self.memory.lock().unwrap();
            match memory.peek(hash) {
                Some(entry) => entry.base64_thumbnail.clone(),
                None => return false,
            }
        };

        let Ok(bytes) = STANDARD.decode(base64_thumbnail.as_bytes()) else {
            return false;
        };
        match std::fs::write(self.disk_path(hash), bytes) {
            Ok(()) => {
                let mut memory = self.memory.lock().unwrap();
                if let Some(entry) = memory.peek_mut(hash) {
                    entry.persisted = true;
                }
                true
            }
            Err(e) => {
                warn!(hash, error = %e, "persist_batch failed to write thumbnail to disk");
                false
            }
        }
    }

    /// Evicts memory-only entries older than the configured TTL.
    pub fn cleanup_expired_memory(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.memory_ttl_seconds);
        let mut memory = self.memory.lock().unwrap();
        let expired = memory.expired_memory_only(cutoff);
        for hash in &expired {
            memory.remove(hash);
        }
        expired.len()
    }

    /// Deletes on-disk images whose hash is unreferenced and whose mtime
    /// predates `now - safety_window_minutes` (spec §4.1).
    pub fn cleanup_orphans(&self, referenced: &std::collections::HashSet<String>, safety_window_minutes: i64) -> usize {
        let cutoff = std::time::SystemTime::now()
            - std::time::Duration::from_secs((safety_window_minutes.max(0) as u64) * 60);
        let mut removed = 0;
        let Ok(read_dir) = std::fs::read_dir(&self.disk_dir) else {
            return 0;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            let Some(hash) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if referenced.contains(hash) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            if modified < cutoff && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn evict_under_pressure(&self, memory: &mut MemoryCache) {
        while memory.len() > self.memory_cache_size {
            if memory.evict_one().is_none() {
                break;
            }
        }
    }

    pub fn disk_dir(&self) -> &Path {
        &self.disk_dir
    }
}

fn encode_thumbnail(image_bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(image_bytes)?;
    let (w, h) = (img.width(), img.height());
    let (target_w, target_h) = shrink_to_threshold(w, h);
    let resized = if (target_w, target_h) != (w, h) {
        img.resize_exact(target_w, target_h, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = resized.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)?;
    Ok(buf)
}

/// Scales any dimension above `MAX_DIMENSION` down by `SCALE_FACTOR`,
/// repeating until both dimensions fit (spec §4.1).
fn shrink_to_threshold(mut w: u32, mut h: u32) -> (u32, u32) {
    let mut iterations = 0;
    while (w > MAX_DIMENSION || h > MAX_DIMENSION) && iterations < 16 {
        w = ((w as f64) * SCALE_FACTOR) as u32;
        h = ((h as f64) * SCALE_FACTOR) as u32;
        iterations += 1;
    }
    (w.max(1), h.max(1))
}
