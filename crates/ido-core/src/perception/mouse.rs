//! MouseCapture (spec §4.2).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use super::{ActiveMonitorTracker, PauseFlag, PerceptionSource};
use crate::record::{MouseAction, MouseData, RawRecord, RawRecordData};

/// Emits records for click/press/release/scroll/drag; mere moves are
/// suppressed entirely and instead drive a low-rate position callback
/// consumed by the ActiveMonitorTracker (spec §4.2).
pub struct MouseCapture {
    pause: PauseFlag,
    sender: UnboundedSender<RawRecord>,
    active_monitor: Arc<ActiveMonitorTracker>,
}

impl MouseCapture {
    pub fn new(
        sender: UnboundedSender<RawRecord>,
        pause: PauseFlag,
        active_monitor: Arc<ActiveMonitorTracker>,
    ) -> Self {
        Self { pause, sender, active_monitor }
    }

    pub fn emit(&self, action: MouseAction, position: Option<(i32, i32)>, at: DateTime<Utc>) {
        if self.pause.is_paused() {
            return;
        }
        let record = RawRecord::new(
            at,
            RawRecordData::Mouse(MouseData { action, position, merged_count: 0 }),
        );
        let _ = self.sender.send(record);
    }

    /// Low-rate position update, distinct from a RawRecord: feeds the
    /// ActiveMonitorTracker only, even while paused (pure telemetry, no
    /// user-data emission).
    pub fn on_position(&self, monitor_index: u32, at: DateTime<Utc>) {
        self.active_monitor.on_mouse_position(monitor_index, at);
    }
}

impl PerceptionSource for MouseCapture {
    fn start(&self) {
        self.pause.set(false);
    }

    fn stop(&self) {
        self.pause.set(true);
    }
}
