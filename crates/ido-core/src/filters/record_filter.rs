//! RecordFilter — merges consecutive scrolls/clicks and gates windows
//! with too few screenshots to be worth extracting from (spec §4.5).

use crate::record::{MouseAction, MouseData, RawRecord, RawRecordData};

#[derive(Debug, Clone, Copy)]
pub struct RecordFilterConfig {
    pub scroll_merge_threshold_seconds: f64,
    pub click_merge_threshold_seconds: f64,
    /// Below this many screenshots, a window is not worth extracting
    /// from at all (spec §4.5).
    pub min_screenshots_per_window: usize,
}

impl Default for RecordFilterConfig {
    fn default() -> Self {
        Self {
            scroll_merge_threshold_seconds: 0.1,
            click_merge_threshold_seconds: 0.5,
            min_screenshots_per_window: 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordFilter {
    config: RecordFilterConfig,
}

impl RecordFilter {
    pub fn new(config: RecordFilterConfig) -> Self {
        Self { config }
    }

    /// Merges consecutive scrolls and adjacent same-action clicks within
    /// their respective thresholds into a single representative record
    /// carrying `merged_count`. Non-mouse records and mouse records that
    /// don't qualify for merging pass through unchanged, in order.
    pub fn merge(&self, records: &[RawRecord]) -> Vec<RawRecord> {
        let mut out: Vec<RawRecord> = Vec::with_capacity(records.len());

        for record in records {
            if let RawRecordData::Mouse(data) = &record.data {
                if matches!(data.action, MouseAction::Scroll | MouseAction::Click) {
                    if let Some(last) = out.last_mut() {
                        if let RawRecordData::Mouse(last_data) = &mut last.data {
                            if last_data.action == data.action
                                && self.within_threshold(last.timestamp, record.timestamp, data.action)
                            {
                                last_data.merged_count += 1;
                                last.timestamp = record.timestamp;
                                continue;
                            }
                        }
                    }
                }
            }
            out.push(record.clone());
        }
        out
    }

    fn within_threshold(&self, prev: chrono::DateTime<chrono::Utc>, next: chrono::DateTime<chrono::Utc>, action: MouseAction) -> bool {
        let threshold = match action {
            MouseAction::Scroll => self.config.scroll_merge_threshold_seconds,
            MouseAction::Click => self.config.click_merge_threshold_seconds,
            _ => return false,
        };
        let elapsed = (next - prev).num_milliseconds() as f64 / 1000.0;
        elapsed >= 0.0 && elapsed <= threshold
    }

    /// Whether `screenshots` clears the minimum worth extracting from.
    pub fn meets_minimum_screenshots(&self, screenshots: &[RawRecord]) -> bool {
        screenshots.len() >= self.config.min_screenshots_per_window
    }
}

fn merged_mouse(action: MouseAction, position: Option<(i32, i32)>, count: u32) -> MouseData {
    MouseData { action, position, merged_count: count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mouse(action: MouseAction, at: chrono::DateTime<chrono::Utc>) -> RawRecord {
        RawRecord::new(at, RawRecordData::Mouse(merged_mouse(action, Some((0, 0)), 0)))
    }

    #[test]
    fn merges_rapid_consecutive_scrolls() {
        let filter = RecordFilter::default();
        let t0 = Utc::now();
        let records = vec![
            mouse(MouseAction::Scroll, t0),
            mouse(MouseAction::Scroll, t0 + chrono::Duration::milliseconds(50)),
            mouse(MouseAction::Scroll, t0 + chrono::Duration::milliseconds(90)),
        ];
        let merged = filter.merge(&records);
        assert_eq!(merged.len(), 1);
        if let RawRecordData::Mouse(data) = &merged[0].data {
            assert_eq!(data.merged_count, 2);
        } else {
            panic!("expected mouse record");
        }
    }

    #[test]
    fn does_not_merge_scrolls_beyond_threshold() {
        let filter = RecordFilter::default();
        let t0 = Utc::now();
        let records = vec![
            mouse(MouseAction::Scroll, t0),
            mouse(MouseAction::Scroll, t0 + chrono::Duration::milliseconds(500)),
        ];
        let merged = filter.merge(&records);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn does_not_merge_different_actions() {
        let filter = RecordFilter::default();
        let t0 = Utc::now();
        let records = vec![mouse(MouseAction::Click, t0), mouse(MouseAction::Scroll, t0)];
        let merged = filter.merge(&records);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn minimum_screenshot_gate() {
        let filter = RecordFilter::new(RecordFilterConfig {
            min_screenshots_per_window: 2,
            ..Default::default()
        });
        assert!(!filter.meets_minimum_screenshots(&[]));
    }
}
