//! ActiveMonitorTracker — "the monitor the user is on" (spec §4.2).

use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Default)]
struct State {
    active_monitor: Option<u32>,
    last_activity: Option<DateTime<Utc>>,
}

/// Tracks the active monitor from the latest mouse position. Never
/// reverts to multi-monitor capture on inactivity: once set, the last
/// known active monitor stays active until a new position arrives on a
/// different monitor (spec §4.2).
#[derive(Default)]
pub struct ActiveMonitorTracker {
    state: Mutex<State>,
}

impl ActiveMonitorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_mouse_position(&self, monitor_index: u32, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.active_monitor = Some(monitor_index);
        state.last_activity = Some(at);
    }

    /// Keyboard activity updates the activity timestamp only, never the
    /// active monitor itself (spec §4.2).
    pub fn on_keyboard_activity(&self, at: DateTime<Utc>) {
        self.state.lock().unwrap().last_activity = Some(at);
    }

    pub fn active_monitor(&self) -> Option<u32> {
        self.state.lock().unwrap().active_monitor
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().last_activity
    }
}
