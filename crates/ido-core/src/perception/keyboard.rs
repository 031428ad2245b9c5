//! KeyboardCapture (spec §4.2).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use super::{ActiveMonitorTracker, PauseFlag, PerceptionSource};
use crate::record::{KeyType, KeyboardData, RawRecord, RawRecordData};

/// Emits one RawRecord per keystroke, classified as `char`/`special`
/// with the active modifier set attached (spec §4.2).
pub struct KeyboardCapture {
    pause: PauseFlag,
    sender: UnboundedSender<RawRecord>,
    active_monitor: Arc<ActiveMonitorTracker>,
}

impl KeyboardCapture {
    pub fn new(
        sender: UnboundedSender<RawRecord>,
        pause: PauseFlag,
        active_monitor: Arc<ActiveMonitorTracker>,
    ) -> Self {
        Self { pause, sender, active_monitor }
    }

    /// Called by the OS hook bridge for every keystroke. Non-suspending:
    /// classifies and enqueues, then returns immediately (spec §5).
    pub fn emit(&self, key: String, key_type: KeyType, modifiers: BTreeSet<String>, at: DateTime<Utc>) {
        if self.pause.is_paused() {
            return;
        }
        self.active_monitor.on_keyboard_activity(at);
        let record = RawRecord::new(
            at,
            RawRecordData::Keyboard(KeyboardData { key_type, key, modifiers }),
        );
        let _ = self.sender.send(record);
    }
}

impl PerceptionSource for KeyboardCapture {
    fn start(&self) {
        self.pause.set(false);
    }

    fn stop(&self) {
        self.pause.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_capture_drops_events_silently() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let pause = PauseFlag::new();
        let capture = KeyboardCapture::new(tx, pause.clone(), Arc::new(ActiveMonitorTracker::new()));
        pause.set(true);
        capture.emit("a".into(), KeyType::Char, BTreeSet::new(), Utc::now());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn running_capture_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let capture = KeyboardCapture::new(tx, PauseFlag::new(), Arc::new(ActiveMonitorTracker::new()));
        capture.emit("a".into(), KeyType::Char, BTreeSet::new(), Utc::now());
        assert!(rx.try_recv().is_ok());
    }
}
