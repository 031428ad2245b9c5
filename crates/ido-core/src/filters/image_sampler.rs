//! ImageSampler — interval- and count-bounded subsampling for LLM
//! ingestion (spec §4.6).

use chrono::{DateTime, Utc};

use crate::record::RawRecord;

const DEFAULT_MAX_IMAGES: usize = 10;
const DEFAULT_MIN_INTERVAL_SECONDS: f64 = 2.5;

pub struct ImageSampler {
    max_images: usize,
    min_interval_seconds: f64,
}

impl Default for ImageSampler {
    fn default() -> Self {
        Self {
            max_images: DEFAULT_MAX_IMAGES,
            min_interval_seconds: DEFAULT_MIN_INTERVAL_SECONDS,
        }
    }
}

impl ImageSampler {
    pub fn new(max_images: usize, min_interval_seconds: f64) -> Self {
        Self { max_images, min_interval_seconds }
    }

    /// Returns at most `max_images` entries, each at least `min_interval`
    /// apart, keeping the earliest candidate in each interval. Assumes
    /// `screenshots` is already in timestamp order (spec §4.6).
    pub fn sample(&self, screenshots: &[RawRecord]) -> Vec<RawRecord> {
        let mut out: Vec<RawRecord> = Vec::new();
        let mut last_kept: Option<DateTime<Utc>> = None;

        for record in screenshots {
            if out.len() >= self.max_images {
                break;
            }
            let keep = match last_kept {
                None => true,
                Some(prev) => {
                    (record.timestamp - prev).num_milliseconds() as f64 / 1000.0
                        >= self.min_interval_seconds
                }
            };
            if keep {
                last_kept = Some(record.timestamp);
                out.push(record.clone());
            }
        }
        out
    }
}
