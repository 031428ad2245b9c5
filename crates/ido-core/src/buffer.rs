//! SlidingWindowBuffer and EventBuffer (spec §4.3).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::record::RawRecord;

const DEFAULT_WINDOW_SECONDS: i64 = 60;

/// A time-bounded ring of RawRecords. `add` is O(1) amortized; no record
/// older than `now - window_size` is ever returned (spec §4.3).
pub struct SlidingWindowBuffer {
    window: chrono::Duration,
    records: Mutex<VecDeque<RawRecord>>,
}

impl SlidingWindowBuffer {
    pub fn new() -> Self {
        Self::with_window_seconds(DEFAULT_WINDOW_SECONDS)
    }

    pub fn with_window_seconds(seconds: i64) -> Self {
        Self {
            window: chrono::Duration::seconds(seconds),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add(&self, record: RawRecord) {
        self.records.lock().unwrap().push_back(record);
    }

    /// Records with `t0 <= timestamp < t1`, in capture order.
    pub fn records_in(&self, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Vec<RawRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.timestamp >= t0 && r.timestamp < t1)
            .cloned()
            .collect()
    }

    /// Drops every record with `timestamp < now - window_size`.
    pub fn drop_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

impl Default for SlidingWindowBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only queue for UI streaming / non-core consumers. Independent
/// of the ring: no semantic relationship, drained separately (spec §4.3).
#[derive(Default)]
pub struct EventBuffer {
    records: Mutex<VecDeque<RawRecord>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: RawRecord) {
        self.records.lock().unwrap().push_back(record);
    }

    /// Drains everything currently buffered, oldest first.
    pub fn drain(&self) -> Vec<RawRecord> {
        self.records.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MouseAction, MouseData, RawRecordData};

    fn mouse_record(ts: DateTime<Utc>) -> RawRecord {
        RawRecord::new(
            ts,
            RawRecordData::Mouse(MouseData {
                action: MouseAction::Click,
                position: Some((1, 1)),
                merged_count: 0,
            }),
        )
    }

    #[test]
    fn drop_expired_removes_only_stale_records() {
        let buffer = SlidingWindowBuffer::with_window_seconds(60);
        let now = Utc::now();
        buffer.add(mouse_record(now - chrono::Duration::seconds(120)));
        buffer.add(mouse_record(now - chrono::Duration::seconds(10)));
        let dropped = buffer.drop_expired(now);
        assert_eq!(dropped, 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn records_in_is_half_open_on_the_upper_bound() {
        let buffer = SlidingWindowBuffer::with_window_seconds(600);
        let base = Utc::now();
        buffer.add(mouse_record(base));
        buffer.add(mouse_record(base + chrono::Duration::seconds(5)));
        let window = buffer.records_in(base, base + chrono::Duration::seconds(5));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn event_buffer_is_independent_of_the_ring() {
        let events = EventBuffer::new();
        events.push(mouse_record(Utc::now()));
        assert_eq!(events.len(), 1);
        assert_eq!(events.drain().len(), 1);
        assert!(events.is_empty());
    }
}
