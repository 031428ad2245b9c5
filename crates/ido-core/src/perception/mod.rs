//! PerceptionSources: keyboard, mouse, screenshot capture; active-monitor
//! tracker; screen-lock monitor (spec §4.2).
//!
//! Real OS-level hooking (keyboard/mouse hook bridges, screen grabbing)
//! is a platform collaborator outside this core's testable surface
//! (spec §1: out of scope beyond thin interfaces). Each source here is
//! driven by an injectable backend trait and a pause flag shared with
//! the ScreenStateMonitor; production wiring plugs in the real OS hook,
//! tests plug in a synthetic one and call the source's `emit`/`tick`
//! methods directly.

mod active_monitor;
mod keyboard;
mod mouse;
mod screen_state;
mod screenshot;

pub use active_monitor::ActiveMonitorTracker;
pub use keyboard::KeyboardCapture;
pub use mouse::MouseCapture;
pub use screen_state::ScreenStateMonitor;
pub use screenshot::{ActiveWindowProvider, MonitorSet, ScreenGrabber, ScreenshotCapture, ScreenshotFrame};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared pause flag: a pause signal halts emission without stopping
/// the underlying OS hook (spec §4.2).
#[derive(Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, paused: bool) {
        self.0.store(paused, Ordering::Release);
    }
}

/// Common capability every capture source shares: `start`/`stop` are
/// idempotent (spec §5); pause/resume is driven by [`PauseFlag`].
pub trait PerceptionSource: Send + Sync {
    fn start(&self);
    fn stop(&self);
}
